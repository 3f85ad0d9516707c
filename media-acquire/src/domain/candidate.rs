//! Transfer candidates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::filename::sanitize_filename;

/// One discoverable transfer option (a torrent) for a media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identifier, typically the info hash.
    pub id: String,
    pub name: String,
    /// Magnet URI or .torrent URL.
    pub link: String,
    #[serde(default)]
    pub seeders: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Temporary download directory, assigned per attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        link: impl Into<String>,
        seeders: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            link: link.into(),
            seeders,
            size_bytes: None,
            temp_dir: None,
        }
    }

    /// Return a copy bound to a fresh temporary directory under `temp_root`.
    ///
    /// The directory name combines the item id with a random suffix so that
    /// retries of one item and concurrent items never collide.
    pub fn with_unique_temp_dir(&self, temp_root: &Path, item_id: &str) -> Self {
        let dir = temp_root.join(format!(
            "{}-{}",
            sanitize_filename(item_id),
            uuid::Uuid::new_v4().simple()
        ));
        Self {
            temp_dir: Some(dir),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_temp_dirs_per_attempt() {
        let candidate = Candidate::new("abc", "Show.S01E01", "magnet:?xt=urn:btih:abc", 3);
        let root = Path::new("/tmp/acquire");

        let first = candidate.with_unique_temp_dir(root, "show/s01e01");
        let second = candidate.with_unique_temp_dir(root, "show/s01e01");

        let first_dir = first.temp_dir.unwrap();
        let second_dir = second.temp_dir.unwrap();
        assert_ne!(first_dir, second_dir);
        assert!(first_dir.starts_with(root));
        let name = first_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("show_s01e01-"));
        assert_eq!(first.id, "abc");
    }

    #[test]
    fn test_deserialize_minimal_candidate() {
        let json = r#"{"id":"h1","name":"Movie 2020","link":"magnet:?xt=urn:btih:h1"}"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.seeders, 0);
        assert!(candidate.temp_dir.is_none());
    }
}
