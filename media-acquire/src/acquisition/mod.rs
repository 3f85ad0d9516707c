//! Acquisition core: per-item supervision, its task registry and startup
//! recovery.

pub mod recovery;
pub mod registry;
pub mod supervisor;

pub use recovery::{RecoveryCoordinator, RecoveryReport};
pub use registry::{TaskLease, TaskRegistry};
pub use supervisor::{
    AbortOutcome, DEFAULT_ATTEMPT_LIMIT, DownloadSupervisor, RequestOutcome, SupervisorConfig,
};
