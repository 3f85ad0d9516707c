//! Download backend trait and related types.

mod transmission;

pub use transmission::{TransmissionBackend, TransmissionConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::Candidate;

/// Backend-reported state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Downloading,
    /// Payload complete (seeding or finished).
    Seeding,
    /// Stopped, errored or otherwise dead.
    Stopped,
    Unknown,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability interface to the external download client.
///
/// Transfers are addressed by the candidate plus the backend-issued transfer
/// id, when one is known. Implementations fall back to the candidate id when
/// the transfer id is missing (for example when cleaning up a submission
/// that failed half-way).
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Submit `candidate`, downloading into `candidate.temp_dir`.
    /// Returns the backend transfer id.
    async fn submit(&self, candidate: &Candidate) -> Result<String>;

    /// Remove a transfer, optionally deleting its data.
    async fn remove(
        &self,
        candidate: &Candidate,
        transfer_id: Option<&str>,
        delete_data: bool,
    ) -> Result<()>;

    async fn status(&self, candidate: &Candidate, transfer_id: &str) -> Result<TransferStatus>;

    /// Whether the backend is reachable and accepting work.
    async fn is_alive(&self) -> bool;
}
