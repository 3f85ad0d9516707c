//! Tracked media items (episodes and movies).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::acquisition::{AcquisitionItem, AcquisitionState};
use super::candidate::Candidate;
use crate::utils::filename::{episode_code, sanitize_filename, season_dir};

/// Library root directories per media kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRoots {
    pub tv: PathBuf,
    pub movies: PathBuf,
}

/// Per-kind naming rules for library placement.
pub trait LibraryTarget {
    /// Human-readable label used in logs and notifications.
    fn display_title(&self) -> String;

    /// Final location of the payload, given its file extension.
    fn destination(&self, roots: &LibraryRoots, extension: &str) -> PathBuf;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub show_title: String,
    pub season: u32,
    pub episode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
}

impl LibraryTarget for EpisodeInfo {
    fn display_title(&self) -> String {
        format!(
            "{} {}",
            self.show_title,
            episode_code(self.season, self.episode)
        )
    }

    fn destination(&self, roots: &LibraryRoots, extension: &str) -> PathBuf {
        let show = sanitize_filename(&self.show_title);
        let file = format!(
            "{} - {}.{}",
            show,
            episode_code(self.season, self.episode),
            extension
        );
        roots.tv.join(&show).join(season_dir(self.season)).join(file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

impl MovieInfo {
    fn folder_name(&self) -> String {
        let title = sanitize_filename(&self.title);
        match self.year {
            Some(year) => format!("{} ({})", title, year),
            None => title,
        }
    }
}

impl LibraryTarget for MovieInfo {
    fn display_title(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }

    fn destination(&self, roots: &LibraryRoots, extension: &str) -> PathBuf {
        let folder = self.folder_name();
        let file = format!("{}.{}", folder, extension);
        roots.movies.join(&folder).join(file)
    }
}

/// What an item is, with the metadata needed to place it in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaKind {
    Episode(EpisodeInfo),
    Movie(MovieInfo),
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episode(_) => "episode",
            Self::Movie(_) => "movie",
        }
    }

    pub fn target(&self) -> &dyn LibraryTarget {
        match self {
            Self::Episode(info) => info,
            Self::Movie(info) => info,
        }
    }
}

/// A tracked media unit with its embedded acquisition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    pub acquisition: AcquisitionItem,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            acquisition: AcquisitionItem::default(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn episode(
        id: impl Into<String>,
        show_title: impl Into<String>,
        season: u32,
        episode: u32,
    ) -> Self {
        Self::new(
            id,
            MediaKind::Episode(EpisodeInfo {
                show_title: show_title.into(),
                season,
                episode,
                episode_title: None,
            }),
        )
    }

    pub fn movie(id: impl Into<String>, title: impl Into<String>, year: Option<u16>) -> Self {
        Self::new(
            id,
            MediaKind::Movie(MovieInfo {
                title: title.into(),
                year,
            }),
        )
    }

    pub fn state(&self) -> AcquisitionState {
        self.acquisition.state
    }

    /// Transition the embedded acquisition state.
    pub fn set_state(&mut self, state: AcquisitionState) -> crate::Result<()> {
        self.acquisition.transition(state)?;
        self.touch();
        Ok(())
    }

    pub fn candidate_list(&self) -> &[Candidate] {
        &self.acquisition.candidate_list
    }

    pub fn title(&self) -> String {
        self.kind.target().display_title()
    }

    /// Library path for a payload with the given extension.
    pub fn destination(&self, roots: &LibraryRoots, extension: &str) -> PathBuf {
        self.kind.target().destination(roots, extension)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
