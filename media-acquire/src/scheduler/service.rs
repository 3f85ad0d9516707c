//! Acquisition poll loop.
//!
//! Periodically asks the supervisor to start work on every item that is
//! waiting for it: `Idle` items and `Failed` items whose last attempt found
//! no candidates. The supervisor's single-flight registry makes repeated
//! requests for an item that is already running harmless.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::acquisition::{DownloadSupervisor, RequestOutcome};
use crate::database::repositories::MediaItemRepository;
use crate::domain::{AcquisitionState, MediaItem};

/// Default poll interval (5 minutes).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Counters for one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub considered: usize,
    pub started: usize,
    pub rejected: usize,
    pub not_found: usize,
    pub errors: usize,
}

pub struct AcquisitionScheduler {
    repo: Arc<dyn MediaItemRepository>,
    supervisor: Arc<DownloadSupervisor>,
    config: SchedulerConfig,
    cancellation_token: CancellationToken,
}

impl AcquisitionScheduler {
    pub fn new(
        repo: Arc<dyn MediaItemRepository>,
        supervisor: Arc<DownloadSupervisor>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_cancellation(repo, supervisor, config, CancellationToken::new())
    }

    pub fn with_cancellation(
        repo: Arc<dyn MediaItemRepository>,
        supervisor: Arc<DownloadSupervisor>,
        config: SchedulerConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            repo,
            supervisor,
            config,
            cancellation_token,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    /// Run until the cancellation token fires.
    ///
    /// Running supervision tasks are left alone on shutdown. Their state is
    /// persisted and startup recovery picks them up again.
    pub async fn run(&self) -> Result<()> {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Starting acquisition scheduler"
        );

        loop {
            match self.poll_once().await {
                Ok(report) if report.considered > 0 => {
                    info!(
                        considered = report.considered,
                        started = report.started,
                        rejected = report.rejected,
                        not_found = report.not_found,
                        errors = report.errors,
                        "Poll pass complete"
                    );
                }
                Ok(_) => debug!("Nothing to acquire"),
                Err(e) => error!(error = %e, "Poll pass failed"),
            }

            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    info!("Scheduler received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        let active = self.supervisor.active_items();
        if !active.is_empty() {
            info!(active = active.len(), "Leaving running acquisitions for recovery");
        }
        Ok(())
    }

    /// Load the waiting items and request acquisition for each.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let mut items = self.repo.load_items_by_state(AcquisitionState::Idle).await?;
        items.extend(
            self.repo
                .load_items_by_state(AcquisitionState::Failed)
                .await?
                .into_iter()
                .filter(|item| item.acquisition.is_eligible_for_poll()),
        );

        let mut report = PollReport::default();
        for item in items {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            report.considered += 1;
            self.request(&item, &mut report).await;
        }
        Ok(report)
    }

    async fn request(&self, item: &MediaItem, report: &mut PollReport) {
        match self.supervisor.request_acquisition(&item.id).await {
            Ok(RequestOutcome::Started { .. }) => report.started += 1,
            Ok(RequestOutcome::Rejected(reason)) => {
                debug!(item_id = %item.id, %reason, "Acquisition rejected");
                report.rejected += 1;
            }
            Ok(RequestOutcome::NoCandidates) => report.not_found += 1,
            Ok(outcome) => debug!(item_id = %item.id, ?outcome, "Acquisition not started"),
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Acquisition request failed");
                report.errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SchedulerConfig {
            poll_interval_secs: 0,
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
