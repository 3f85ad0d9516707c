//! Startup recovery of acquisitions interrupted by a restart.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::supervisor::{DownloadSupervisor, RequestOutcome};
use crate::Result;
use crate::database::repositories::MediaItemRepository;
use crate::domain::AcquisitionState;

/// What startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Items whose supervision was restarted.
    pub resumed: Vec<String>,
    /// Items whose interrupted abort was completed.
    pub aborted: Vec<String>,
    /// Items reset to `Idle` without restarting supervision.
    pub reset: Vec<String>,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.resumed.len() + self.aborted.len() + self.reset.len()
    }
}

/// Re-attaches supervision to items persisted mid-transfer.
pub struct RecoveryCoordinator {
    repo: Arc<dyn MediaItemRepository>,
    supervisor: Arc<DownloadSupervisor>,
}

impl RecoveryCoordinator {
    pub fn new(repo: Arc<dyn MediaItemRepository>, supervisor: Arc<DownloadSupervisor>) -> Self {
        Self { repo, supervisor }
    }

    /// Recover every item left in `Downloading` or `Pending`.
    ///
    /// An abort flag is only persisted while a transfer still has to be
    /// cleaned up, which happens in those two states alone.
    ///
    /// Must run once at startup, before the poll loop. Soft-deleted
    /// `Downloading` items are restored. Items with an abort in progress have
    /// the abort finished. Others are reset to `Idle` with their transfer
    /// kept attached, then handed back to the supervisor, which monitors the
    /// existing transfer instead of submitting it again. Resumed supervision
    /// runs detached; this returns once every task has been started.
    ///
    /// Only a failure to load the item lists is returned. Per-item problems
    /// are logged and the item is skipped.
    pub async fn recover_in_flight(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let downloading = self
            .repo
            .load_items_by_state_including_deleted(AcquisitionState::Downloading)
            .await?;
        for mut item in downloading {
            let item_id = item.id.clone();

            if item.is_deleted() {
                info!(item_id = %item_id, "Restoring soft-deleted item with an in-flight transfer");
                item.deleted_at = None;
            }

            if item.acquisition.abort_requested {
                if let Err(e) = self.repo.save_item(&item).await {
                    error!(item_id = %item_id, error = %e, "Failed to persist recovered item");
                    continue;
                }
                let aborted = self.supervisor.abort_acquisition(&item_id).await;
                match aborted {
                    Ok(_) => report.aborted.push(item_id),
                    Err(e) => error!(item_id = %item_id, error = %e, "Failed to finish interrupted abort"),
                }
                continue;
            }

            if let Err(e) = item.set_state(AcquisitionState::Idle) {
                error!(item_id = %item_id, error = %e, "Cannot reset recovered item");
                continue;
            }
            if let Err(e) = self.repo.save_item(&item).await {
                error!(item_id = %item_id, error = %e, "Failed to persist recovered item");
                continue;
            }

            let resumed = self.supervisor.resume(&item_id).await;
            match resumed {
                Ok(RequestOutcome::Started { .. }) => report.resumed.push(item_id),
                Ok(outcome) => {
                    warn!(item_id = %item_id, ?outcome, "Recovered item was not resumed");
                    report.reset.push(item_id);
                }
                Err(e) => {
                    error!(item_id = %item_id, error = %e, "Failed to resume item");
                    report.reset.push(item_id);
                }
            }
        }

        // Pending never outlives a request, so these were cut off mid-request.
        let pending = self
            .repo
            .load_items_by_state(AcquisitionState::Pending)
            .await?;
        for mut item in pending {
            let item_id = item.id.clone();
            if self.supervisor.is_active(&item_id) {
                continue;
            }
            if item.acquisition.abort_requested {
                let aborted = self.supervisor.abort_acquisition(&item_id).await;
                match aborted {
                    Ok(_) => report.aborted.push(item_id),
                    Err(e) => error!(item_id = %item_id, error = %e, "Failed to finish interrupted abort"),
                }
                continue;
            }
            if let Err(e) = item.set_state(AcquisitionState::Idle) {
                error!(item_id = %item_id, error = %e, "Cannot reset pending item");
                continue;
            }
            match self.repo.save_item(&item).await {
                Ok(()) => report.reset.push(item_id),
                Err(e) => error!(item_id = %item_id, error = %e, "Failed to reset pending item"),
            }
        }

        info!(
            resumed = report.resumed.len(),
            aborted = report.aborted.len(),
            reset = report.reset.len(),
            "Recovery complete"
        );
        Ok(report)
    }
}
