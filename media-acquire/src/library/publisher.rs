//! Library publisher: move a finished payload into the library layout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::media_center::MediaCenter;
use crate::domain::{LibraryRoots, MediaItem};
use crate::utils::filename::extension_lower;
use crate::utils::fs;
use crate::{Error, Result};

/// Extensions treated as the primary video payload.
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v", "avi", "mov", "wmv", "ts", "webm"];

/// Where a payload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPayload {
    pub destination: PathBuf,
    pub bytes: u64,
}

pub struct LibraryPublisher {
    roots: LibraryRoots,
    media_centers: Vec<Arc<dyn MediaCenter>>,
}

impl LibraryPublisher {
    pub fn new(roots: LibraryRoots) -> Self {
        Self {
            roots,
            media_centers: Vec::new(),
        }
    }

    pub fn with_media_center(mut self, center: Arc<dyn MediaCenter>) -> Self {
        self.media_centers.push(center);
        self
    }

    pub fn roots(&self) -> &LibraryRoots {
        &self.roots
    }

    /// Move the payload found in `temp_dir` to the item's library path.
    ///
    /// Move errors are returned. After a successful move the temporary
    /// directory is removed and media centers are refreshed, both best-effort.
    pub async fn publish(&self, item: &MediaItem, temp_dir: &Path) -> Result<PublishedPayload> {
        let payload = select_payload(temp_dir).await?;
        let extension = payload
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(extension_lower)
            .unwrap_or_else(|| "bin".to_string());
        let destination = item.destination(&self.roots, &extension);

        debug!(
            item_id = %item.id,
            source = %payload.display(),
            destination = %destination.display(),
            "Publishing payload"
        );
        let bytes = fs::move_file(&payload, &destination).await?;
        info!(
            item_id = %item.id,
            destination = %destination.display(),
            bytes,
            "Published to library"
        );

        fs::remove_dir_best_effort(temp_dir).await;
        self.refresh_media_centers().await;

        Ok(PublishedPayload { destination, bytes })
    }

    /// Delete an attempt's temporary directory.
    pub async fn discard(&self, temp_dir: &Path) -> bool {
        fs::remove_dir_best_effort(temp_dir).await
    }

    /// Ask every media center to rescan. Failures are logged individually.
    pub async fn refresh_media_centers(&self) {
        let refreshes = self.media_centers.iter().map(|center| async move {
            if let Err(e) = center.refresh().await {
                warn!(media_center = center.name(), error = %e, "Library refresh failed");
            } else {
                debug!(media_center = center.name(), "Library refresh triggered");
            }
        });
        futures::future::join_all(refreshes).await;
    }
}

/// Pick the payload file: the largest video file, else the largest file.
async fn select_payload(temp_dir: &Path) -> Result<PathBuf> {
    let files = fs::list_files(temp_dir).await?;

    let is_video = |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(extension_lower)
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    };

    let largest_video = files
        .iter()
        .filter(|(path, _)| is_video(path))
        .max_by_key(|(_, size)| *size);
    let largest_any = files.iter().max_by_key(|(_, size)| *size);

    largest_video
        .or(largest_any)
        .map(|(path, _)| path.clone())
        .ok_or_else(|| {
            Error::publish(format!(
                "no payload found in {}",
                temp_dir.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct CountingCenter {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl MediaCenter for CountingCenter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn refresh(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Other("refresh refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn roots(dir: &TempDir) -> LibraryRoots {
        LibraryRoots {
            tv: dir.path().join("tv"),
            movies: dir.path().join("movies"),
        }
    }

    #[tokio::test]
    async fn test_publish_episode_picks_largest_video() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("tmp/ep-1-abc");
        tokio::fs::create_dir_all(temp.join("Subs")).await.unwrap();
        tokio::fs::write(temp.join("Show.S01E02.mkv"), vec![0u8; 64]).await.unwrap();
        tokio::fs::write(temp.join("sample.mkv"), vec![0u8; 8]).await.unwrap();
        tokio::fs::write(temp.join("info.nfo"), vec![0u8; 128]).await.unwrap();
        tokio::fs::write(temp.join("Subs/en.srt"), b"1").await.unwrap();

        let ok_calls = Arc::new(AtomicU32::new(0));
        let failing_calls = Arc::new(AtomicU32::new(0));
        let publisher = LibraryPublisher::new(roots(&dir))
            .with_media_center(Arc::new(CountingCenter {
                calls: failing_calls.clone(),
                fail: true,
            }))
            .with_media_center(Arc::new(CountingCenter {
                calls: ok_calls.clone(),
                fail: false,
            }));
        let item = MediaItem::episode("ep-1", "Show", 1, 2);

        let published = publisher.publish(&item, &temp).await.unwrap();

        assert_eq!(
            published.destination,
            dir.path().join("tv/Show/Season 01/Show - S01E02.mkv")
        );
        assert_eq!(published.bytes, 64);
        assert!(published.destination.exists());
        assert!(!temp.exists());
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_empty_dir_fails_without_refresh() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("tmp/empty");
        tokio::fs::create_dir_all(&temp).await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let publisher = LibraryPublisher::new(roots(&dir)).with_media_center(Arc::new(
            CountingCenter {
                calls: calls.clone(),
                fail: false,
            },
        ));

        let result = publisher
            .publish(&MediaItem::movie("mv-1", "Heat", Some(1995)), &temp)
            .await;

        assert!(matches!(result, Err(Error::Publish(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(temp.exists());
    }

    #[tokio::test]
    async fn test_publish_missing_dir_is_error() {
        let dir = TempDir::new().unwrap();
        let publisher = LibraryPublisher::new(roots(&dir));
        let result = publisher
            .publish(
                &MediaItem::movie("mv-1", "Heat", Some(1995)),
                &dir.path().join("gone"),
            )
            .await;
        assert!(result.is_err());
    }
}
