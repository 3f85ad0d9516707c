//! Scheduler module driving periodic acquisition requests.
//!
//! The scheduler is responsible for:
//! - Polling the repository for items waiting to be acquired
//! - Handing each one to the supervisor, which enforces single-flight
//! - Stopping cleanly when its cancellation token fires

mod service;

pub use service::{AcquisitionScheduler, PollReport, SchedulerConfig};
