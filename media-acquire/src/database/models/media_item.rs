//! Media item database model.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;

use crate::domain::{AcquisitionItem, AcquisitionState, Candidate, MediaItem, MediaKind};
use crate::{Error, Result};

/// Row of the `media_items` table.
///
/// Collections and media metadata are stored as JSON text; timestamps as
/// Unix epoch milliseconds (UTC).
#[derive(Debug, Clone, FromRow)]
pub struct MediaItemDbModel {
    pub id: String,
    /// `episode` or `movie`
    pub kind: String,
    /// Display title, denormalized for listing.
    pub title: String,
    pub media: String,
    /// IDLE, PENDING, DOWNLOADING, DOWNLOADED, FAILED, ABORTED
    pub state: String,
    pub current_candidate: Option<String>,
    pub backend_transfer_id: Option<String>,
    pub failed_candidates: String,
    pub candidate_list: String,
    pub abort_requested: bool,
    pub torrents_not_found: bool,
    pub last_error: Option<String>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl MediaItemDbModel {
    pub fn from_domain(item: &MediaItem) -> Result<Self> {
        let acq = &item.acquisition;
        Ok(Self {
            id: item.id.clone(),
            kind: item.kind.as_str().to_string(),
            title: item.title(),
            media: serde_json::to_string(&item.kind)?,
            state: acq.state.as_str().to_string(),
            current_candidate: acq
                .current_candidate
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            backend_transfer_id: acq.backend_transfer_id.clone(),
            failed_candidates: serde_json::to_string(&acq.failed_candidates)?,
            candidate_list: serde_json::to_string(&acq.candidate_list)?,
            abort_requested: acq.abort_requested,
            torrents_not_found: acq.torrents_not_found,
            last_error: acq.last_error.clone(),
            deleted_at: item.deleted_at.map(|dt| dt.timestamp_millis()),
            created_at: item.created_at.timestamp_millis(),
            updated_at: item.updated_at.timestamp_millis(),
        })
    }

    pub fn into_domain(self) -> Result<MediaItem> {
        let state = AcquisitionState::parse(&self.state).ok_or_else(|| {
            Error::validation(format!(
                "media item {} has unknown state '{}'",
                self.id, self.state
            ))
        })?;
        let kind: MediaKind = serde_json::from_str(&self.media)?;
        let current_candidate: Option<Candidate> = self
            .current_candidate
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let failed_candidates: BTreeMap<String, Candidate> =
            serde_json::from_str(&self.failed_candidates)?;
        let candidate_list: Vec<Candidate> = serde_json::from_str(&self.candidate_list)?;

        Ok(MediaItem {
            id: self.id,
            kind,
            acquisition: AcquisitionItem {
                state,
                current_candidate,
                backend_transfer_id: self.backend_transfer_id,
                failed_candidates,
                candidate_list,
                abort_requested: self.abort_requested,
                torrents_not_found: self.torrents_not_found,
                last_error: self.last_error,
            },
            deleted_at: self.deleted_at.map(ms_to_datetime),
            created_at: ms_to_datetime(self.created_at),
            updated_at: ms_to_datetime(self.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_preserves_acquisition_fields() {
        let mut item = MediaItem::episode("ep-1", "Severance", 2, 1);
        let a = Candidate::new("a", "A", "magnet:a", 3);
        item.acquisition.state = AcquisitionState::Downloading;
        item.acquisition.record_failure(&a);
        item.acquisition
            .attach_transfer(Candidate::new("b", "B", "magnet:b", 1), "hash-b".into());
        item.acquisition.abort_requested = true;

        let model = MediaItemDbModel::from_domain(&item).unwrap();
        assert_eq!(model.state, "DOWNLOADING");
        assert_eq!(model.kind, "episode");
        assert_eq!(model.title, "Severance S02E01");

        let restored = model.into_domain().unwrap();
        assert_eq!(restored.acquisition, item.acquisition);
        assert_eq!(restored.kind, item.kind);
        assert_eq!(
            restored.created_at.timestamp_millis(),
            item.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let item = MediaItem::movie("mv-1", "Heat", Some(1995));
        let mut model = MediaItemDbModel::from_domain(&item).unwrap();
        model.state = "SEEDING".into();
        assert!(matches!(model.into_domain(), Err(Error::Validation(_))));
    }
}
