//! Notification events.
//!
//! Defines the acquisition events that can trigger notifications and their
//! priority levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    #[default]
    Normal,
    High,
    /// Requires operator attention.
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Events emitted by the acquisition core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationEvent {
    /// A request was refused because a collaborator is unhealthy.
    AcquisitionRejected {
        item_id: String,
        title: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Discovery produced no usable candidates.
    TorrentsNotFound {
        item_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    /// A supervision task started for an item.
    DownloadStarted {
        item_id: String,
        title: String,
        candidate_count: usize,
        timestamp: DateTime<Utc>,
    },
    DownloadCompleted {
        item_id: String,
        title: String,
        candidate_name: String,
        library_path: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The failed-candidate limit was exceeded.
    DownloadFailed {
        item_id: String,
        title: String,
        failed_attempts: usize,
        timestamp: DateTime<Utc>,
    },
    DownloadAborted {
        item_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    /// The transfer completed but moving it into the library failed.
    PublishFailed {
        item_id: String,
        title: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Get the priority of this event.
    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::AcquisitionRejected { .. } => NotificationPriority::High,
            Self::TorrentsNotFound { .. } => NotificationPriority::Normal,
            Self::DownloadStarted { .. } => NotificationPriority::Low,
            Self::DownloadCompleted { .. } => NotificationPriority::Normal,
            Self::DownloadFailed { .. } => NotificationPriority::High,
            Self::DownloadAborted { .. } => NotificationPriority::Normal,
            Self::PublishFailed { .. } => NotificationPriority::Critical,
        }
    }

    /// Canonical snake_case event key.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AcquisitionRejected { .. } => "acquisition_rejected",
            Self::TorrentsNotFound { .. } => "torrents_not_found",
            Self::DownloadStarted { .. } => "download_started",
            Self::DownloadCompleted { .. } => "download_completed",
            Self::DownloadFailed { .. } => "download_failed",
            Self::DownloadAborted { .. } => "download_aborted",
            Self::PublishFailed { .. } => "publish_failed",
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::AcquisitionRejected { title, .. } => format!("Acquisition rejected: {}", title),
            Self::TorrentsNotFound { title, .. } => format!("No torrents found: {}", title),
            Self::DownloadStarted { title, .. } => format!("Download started: {}", title),
            Self::DownloadCompleted { title, .. } => format!("Downloaded: {}", title),
            Self::DownloadFailed { title, .. } => format!("Download failed: {}", title),
            Self::DownloadAborted { title, .. } => format!("Download aborted: {}", title),
            Self::PublishFailed { title, .. } => format!("Publish failed: {}", title),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::AcquisitionRejected { reason, .. } => reason.clone(),
            Self::TorrentsNotFound { .. } => {
                "Discovery returned no usable candidates. The item will be retried on the next cycle."
                    .to_string()
            }
            Self::DownloadStarted {
                candidate_count, ..
            } => format!("{} candidate(s) queued", candidate_count),
            Self::DownloadCompleted {
                candidate_name,
                library_path,
                ..
            } => match library_path {
                Some(path) => format!("{} -> {}", candidate_name, path),
                None => candidate_name.clone(),
            },
            Self::DownloadFailed {
                failed_attempts, ..
            } => format!(
                "Gave up after {} failed candidate(s). Manual retry required.",
                failed_attempts
            ),
            Self::DownloadAborted { .. } => "Transfer cancelled and cleaned up".to_string(),
            Self::PublishFailed { error_message, .. } => error_message.clone(),
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            Self::AcquisitionRejected { item_id, .. }
            | Self::TorrentsNotFound { item_id, .. }
            | Self::DownloadStarted { item_id, .. }
            | Self::DownloadCompleted { item_id, .. }
            | Self::DownloadFailed { item_id, .. }
            | Self::DownloadAborted { item_id, .. }
            | Self::PublishFailed { item_id, .. } => item_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::AcquisitionRejected { timestamp, .. }
            | Self::TorrentsNotFound { timestamp, .. }
            | Self::DownloadStarted { timestamp, .. }
            | Self::DownloadCompleted { timestamp, .. }
            | Self::DownloadFailed { timestamp, .. }
            | Self::DownloadAborted { timestamp, .. }
            | Self::PublishFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Event-specific facts as labelled values, in display order.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::AcquisitionRejected { reason, .. } => vec![("reason", reason.clone())],
            Self::TorrentsNotFound { .. } | Self::DownloadAborted { .. } => Vec::new(),
            Self::DownloadStarted {
                candidate_count, ..
            } => vec![("candidates", candidate_count.to_string())],
            Self::DownloadCompleted {
                candidate_name,
                library_path,
                ..
            } => {
                let mut details = vec![("candidate", candidate_name.clone())];
                if let Some(path) = library_path {
                    details.push(("library_path", path.clone()));
                }
                details
            }
            Self::DownloadFailed {
                failed_attempts, ..
            } => vec![("failed_attempts", failed_attempts.to_string())],
            Self::PublishFailed { error_message, .. } => vec![("error", error_message.clone())],
        }
    }

    /// Outcomes that need someone to step in.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. } | Self::PublishFailed { .. }
        )
    }

    /// Events describing a terminal outcome. These are deduplicated per item.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TorrentsNotFound { .. }
                | Self::DownloadCompleted { .. }
                | Self::DownloadFailed { .. }
                | Self::DownloadAborted { .. }
        )
    }
}
