//! Download side of acquisition: backend gateway, candidate queue and
//! transfer monitor.

pub mod backend;
pub mod monitor;
pub mod queue;

pub use backend::{DownloadBackend, TransferStatus, TransmissionBackend, TransmissionConfig};
pub use monitor::{MonitorOutcome, TransferMonitor};
pub use queue::CandidateQueue;
