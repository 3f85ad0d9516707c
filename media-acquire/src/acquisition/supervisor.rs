//! Download supervisor.
//!
//! Owns the per-item acquisition lifecycle: the request phase (health gate,
//! discovery, queue build) runs on the caller, then one detached supervision
//! task per item walks the candidate queue, submitting each candidate to the
//! backend and monitoring it until success, exhaustion, the attempt limit,
//! or an abort.
//!
//! Every state change is persisted before the next externally visible
//! action. Outcomes are reported through the [`Notifier`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::registry::{TaskLease, TaskRegistry};
use crate::database::repositories::MediaItemRepository;
use crate::discovery::CandidateSource;
use crate::domain::{AcquisitionState, Candidate, MediaItem};
use crate::downloader::{CandidateQueue, DownloadBackend, MonitorOutcome, TransferMonitor};
use crate::library::LibraryPublisher;
use crate::notification::{NotificationEvent, Notifier};
use crate::utils::fs;
use crate::{Error, Result};

/// Default number of failed candidates tolerated before an item is failed.
pub const DEFAULT_ATTEMPT_LIMIT: usize = 3;

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// The item fails once more than this many candidates have failed.
    pub attempt_limit: usize,
    pub candidate_window: usize,
    pub monitor_interval: Duration,
    /// Parent of the per-attempt temporary directories.
    pub temp_root: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
            candidate_window: crate::downloader::queue::DEFAULT_CANDIDATE_WINDOW,
            monitor_interval: crate::downloader::monitor::DEFAULT_MONITOR_INTERVAL,
            temp_root: std::env::temp_dir().join("media-acquire"),
        }
    }
}

/// Result of an acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A supervision task is now running.
    Started { candidates: usize },
    /// Another task or operation already holds the item.
    AlreadyActive,
    /// The item's state does not allow a new attempt.
    Skipped(AcquisitionState),
    /// A collaborator was unhealthy or discovery failed.
    Rejected(String),
    /// Discovery yielded nothing usable.
    NoCandidates,
    /// An abort arrived before the supervision task was started.
    Aborted,
}

/// Result of an abort request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The running task was signalled and will finish the abort itself.
    Signalled,
    /// No task was running; the item was reset directly.
    Aborted,
    /// Nothing to abort in this state.
    NoOp(AcquisitionState),
}

/// How a supervision run was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    Recovery,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Recovery => "recovery",
        }
    }
}

/// Per-item acquisition supervisor.
pub struct DownloadSupervisor {
    repo: Arc<dyn MediaItemRepository>,
    backend: Arc<dyn DownloadBackend>,
    discovery: Arc<dyn CandidateSource>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<LibraryPublisher>,
    registry: Arc<TaskRegistry>,
    queue: CandidateQueue,
    monitor: TransferMonitor,
    config: SupervisorConfig,
}

impl DownloadSupervisor {
    pub fn new(
        repo: Arc<dyn MediaItemRepository>,
        backend: Arc<dyn DownloadBackend>,
        discovery: Arc<dyn CandidateSource>,
        notifier: Arc<dyn Notifier>,
        publisher: Arc<LibraryPublisher>,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            backend,
            discovery,
            notifier,
            publisher,
            registry: TaskRegistry::new(),
            queue: CandidateQueue::new(config.candidate_window),
            monitor: TransferMonitor::new(config.monitor_interval),
            config,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn MediaItemRepository> {
        &self.repo
    }

    /// Whether a task or operation currently holds `item_id`.
    pub fn is_active(&self, item_id: &str) -> bool {
        self.registry.is_active(item_id)
    }

    /// Ids of items currently held.
    pub fn active_items(&self) -> Vec<String> {
        self.registry.active_ids()
    }

    /// Wait for `item_id`'s supervision task to finish, if one is running.
    pub async fn join(&self, item_id: &str) {
        if let Some(handle) = self.registry.take_join(item_id)
            && let Err(e) = handle.await
        {
            error!(item_id, error = %e, "Supervision task panicked");
        }
    }

    /// Start acquiring `item_id`.
    ///
    /// Returns once the supervision task is running or the request was
    /// turned down. Repository errors while loading or persisting the item
    /// in the request phase are returned.
    pub async fn request_acquisition(self: &Arc<Self>, item_id: &str) -> Result<RequestOutcome> {
        self.acquire(item_id, Mode::Normal).await
    }

    /// Resume an item whose transfer was in flight when the process stopped.
    pub(crate) async fn resume(self: &Arc<Self>, item_id: &str) -> Result<RequestOutcome> {
        self.acquire(item_id, Mode::Recovery).await
    }

    #[instrument(skip(self, mode), fields(mode = mode.as_str()))]
    async fn acquire(self: &Arc<Self>, item_id: &str, mode: Mode) -> Result<RequestOutcome> {
        if self.registry.is_active(item_id) {
            debug!("Item already has a running task");
            return Ok(RequestOutcome::AlreadyActive);
        }

        // The gate runs before the item is reserved, so an abort arriving
        // meanwhile sees an item at rest.
        let item = self.repo.get_item(item_id).await?;
        if let Some(state) = Self::not_requestable(&item) {
            return Ok(RequestOutcome::Skipped(state));
        }
        if let Some(reason) = self.health_gate().await {
            warn!(%reason, "Acquisition rejected");
            self.notifier.dispatch(NotificationEvent::AcquisitionRejected {
                item_id: item.id.clone(),
                title: item.title(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
            return Ok(RequestOutcome::Rejected(reason));
        }

        let Some(lease) = self.registry.try_reserve(item_id) else {
            debug!("Item was reserved during the health check");
            return Ok(RequestOutcome::AlreadyActive);
        };

        // Reload under the lease; the item may have moved on meanwhile.
        let mut item = self.repo.get_item(item_id).await?;
        if let Some(state) = Self::not_requestable(&item) {
            return Ok(RequestOutcome::Skipped(state));
        }
        let was_not_found =
            item.state() == AcquisitionState::Failed && item.acquisition.torrents_not_found;

        item.set_state(AcquisitionState::Pending)?;
        self.repo.save_item(&item).await?;

        // A transfer left attached by an interrupted run is resumed rather
        // than resubmitted.
        let resumable = item
            .acquisition
            .current_candidate
            .clone()
            .filter(|_| item.acquisition.backend_transfer_id.is_some());

        let ranked = if !item.acquisition.candidate_list.is_empty() {
            Ok(item.acquisition.candidate_list.clone())
        } else if resumable.is_some() {
            Ok(Vec::new())
        } else {
            self.discovery.discover(&item).await
        };

        // From here on the item is Pending, so a signalled abort is applied
        // whatever discovery returned.
        if lease.is_cancelled() {
            info!("Abort requested during the request phase");
            self.finish_abort(&mut item).await;
            return Ok(RequestOutcome::Aborted);
        }

        let ranked = match ranked {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Candidate discovery failed");
                item.acquisition.last_error = Some(e.to_string());
                item.set_state(AcquisitionState::Idle)?;
                self.repo.save_item(&item).await?;
                return Ok(RequestOutcome::Rejected(e.to_string()));
            }
        };

        let mut queue = self.queue.build(&ranked, &item.acquisition);
        if let Some(current) = resumable {
            queue.retain(|c| c.id != current.id);
            queue.insert(0, current);
            queue.truncate(self.queue.window().max(1));
        }

        if queue.is_empty() {
            info!(title = %item.title(), "No usable candidates found");
            item.acquisition.clear_in_flight();
            item.acquisition.torrents_not_found = true;
            item.set_state(AcquisitionState::Failed)?;
            self.repo.save_item(&item).await?;
            if !was_not_found {
                self.notifier.dispatch(NotificationEvent::TorrentsNotFound {
                    item_id: item.id.clone(),
                    title: item.title(),
                    timestamp: Utc::now(),
                });
            }
            return Ok(RequestOutcome::NoCandidates);
        }

        item.acquisition.candidate_list = queue.clone();
        item.acquisition.torrents_not_found = false;
        item.set_state(AcquisitionState::Downloading)?;
        self.repo.save_item(&item).await?;

        if lease.is_cancelled() {
            info!("Abort requested before the supervision task started");
            self.finish_abort(&mut item).await;
            return Ok(RequestOutcome::Aborted);
        }

        let candidates = queue.len();
        info!(title = %item.title(), candidates, "Starting acquisition");
        if mode == Mode::Normal {
            self.notifier.dispatch(NotificationEvent::DownloadStarted {
                item_id: item.id.clone(),
                title: item.title(),
                candidate_count: candidates,
                timestamp: Utc::now(),
            });
        }

        let generation = lease.generation();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.supervise(lease, item, queue).await;
        });
        self.registry.attach(item_id, generation, handle);

        Ok(RequestOutcome::Started { candidates })
    }

    /// The state that rules out a new attempt, if any.
    fn not_requestable(item: &MediaItem) -> Option<AcquisitionState> {
        let state = item.state();
        match state {
            AcquisitionState::Downloading | AcquisitionState::Downloaded => Some(state),
            AcquisitionState::Failed if item.acquisition.is_permanently_failed() => {
                debug!("Item exceeded its attempt limit, waiting for a manual retry");
                Some(state)
            }
            _ => None,
        }
    }

    /// Both the backend and discovery must answer before work starts.
    async fn health_gate(&self) -> Option<String> {
        let (backend_alive, discovery_healthy) =
            tokio::join!(self.backend.is_alive(), self.discovery.is_healthy());
        if !backend_alive {
            Some(format!("download backend {} is unreachable", self.backend.name()))
        } else if !discovery_healthy {
            Some("candidate discovery is unhealthy".to_string())
        } else {
            None
        }
    }

    /// Supervision task body. The lease is released when this returns.
    #[instrument(skip_all, fields(item_id = %item.id))]
    async fn supervise(self: Arc<Self>, lease: TaskLease, mut item: MediaItem, queue: Vec<Candidate>) {
        let token = lease.token().clone();

        for candidate in queue {
            if token.is_cancelled() {
                self.finish_abort(&mut item).await;
                return;
            }
            if item.acquisition.has_failed(&candidate.id) {
                continue;
            }

            let resumed_transfer = match &item.acquisition.current_candidate {
                Some(current) if current.id == candidate.id => {
                    item.acquisition.backend_transfer_id.clone()
                }
                _ => None,
            };

            let (attempt, transfer_id) = match resumed_transfer {
                Some(transfer_id) => {
                    info!(candidate = %candidate.name, %transfer_id, "Resuming transfer");
                    (candidate, transfer_id)
                }
                None => match self.submit(&mut item, &candidate).await {
                    Ok(submitted) => submitted,
                    Err((attempt, e)) => {
                        warn!(candidate = %candidate.name, error = %e, "Submission failed");
                        self.cleanup_attempt(&attempt, None).await;
                        if self.record_failure(&mut item, &attempt, e.to_string()).await {
                            return;
                        }
                        continue;
                    }
                },
            };

            match self
                .monitor
                .watch(self.backend.as_ref(), &attempt, &transfer_id, &token)
                .await
            {
                MonitorOutcome::Success => {
                    self.complete(&mut item, &attempt, &transfer_id).await;
                    return;
                }
                MonitorOutcome::Failure(reason) => {
                    warn!(candidate = %attempt.name, %reason, "Transfer failed");
                    self.cleanup_attempt(&attempt, Some(&transfer_id)).await;
                    if self.record_failure(&mut item, &attempt, reason).await {
                        return;
                    }
                }
                MonitorOutcome::Cancelled => {
                    self.finish_abort(&mut item).await;
                    return;
                }
            }
        }

        if token.is_cancelled() {
            self.finish_abort(&mut item).await;
            return;
        }

        info!(
            failed = item.acquisition.failure_count(),
            "Candidate list exhausted, returning to idle"
        );
        item.acquisition.clear_in_flight();
        self.transition(&mut item, AcquisitionState::Idle);
        self.persist(&mut item).await;
    }

    /// Submit one attempt on a fresh temporary directory.
    ///
    /// On error the attempt is returned so its leftovers can be cleaned up.
    async fn submit(
        &self,
        item: &mut MediaItem,
        candidate: &Candidate,
    ) -> std::result::Result<(Candidate, String), (Candidate, Error)> {
        let attempt = candidate.with_unique_temp_dir(&self.config.temp_root, &item.id);
        if let Some(dir) = &attempt.temp_dir
            && let Err(e) = fs::ensure_dir_all(dir).await
        {
            return Err((attempt, e));
        }

        match self.backend.submit(&attempt).await {
            Ok(transfer_id) => {
                debug!(candidate = %attempt.name, %transfer_id, "Submitted");
                item.acquisition
                    .attach_transfer(attempt.clone(), transfer_id.clone());
                self.persist(item).await;
                Ok((attempt, transfer_id))
            }
            Err(e) => Err((attempt, e)),
        }
    }

    /// Record a failed attempt. Returns `true` once the item has been failed
    /// for exceeding the attempt limit.
    async fn record_failure(&self, item: &mut MediaItem, attempt: &Candidate, reason: String) -> bool {
        item.acquisition.record_failure(attempt);
        item.acquisition.last_error = Some(reason);

        let failed = item.acquisition.failure_count();
        if failed > self.config.attempt_limit {
            warn!(failed, limit = self.config.attempt_limit, "Attempt limit exceeded");
            item.acquisition.clear_in_flight();
            item.acquisition.torrents_not_found = false;
            self.transition(item, AcquisitionState::Failed);
            self.persist(item).await;
            self.notifier.dispatch(NotificationEvent::DownloadFailed {
                item_id: item.id.clone(),
                title: item.title(),
                failed_attempts: failed,
                timestamp: Utc::now(),
            });
            return true;
        }

        self.persist(item).await;
        false
    }

    /// Terminal success path: persist, publish, drop the backend transfer.
    async fn complete(&self, item: &mut MediaItem, attempt: &Candidate, transfer_id: &str) {
        info!(candidate = %attempt.name, "Transfer complete");
        item.acquisition.clear_in_flight();
        item.acquisition.last_error = None;
        self.transition(item, AcquisitionState::Downloaded);
        self.persist(item).await;

        let published = match &attempt.temp_dir {
            Some(dir) => self.publisher.publish(item, dir).await,
            None => Err(Error::publish("attempt has no temporary directory")),
        };
        let library_path = match published {
            Ok(payload) => Some(payload.destination.display().to_string()),
            Err(e) => {
                error!(error = %e, "Publishing to the library failed");
                item.acquisition.last_error = Some(e.to_string());
                self.persist(item).await;
                self.notifier.dispatch(NotificationEvent::PublishFailed {
                    item_id: item.id.clone(),
                    title: item.title(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                None
            }
        };

        if let Err(e) = self.backend.remove(attempt, Some(transfer_id), false).await {
            warn!(error = %e, "Could not remove the finished transfer from the backend");
        }

        self.notifier.dispatch(NotificationEvent::DownloadCompleted {
            item_id: item.id.clone(),
            title: item.title(),
            candidate_name: attempt.name.clone(),
            library_path,
            timestamp: Utc::now(),
        });
    }

    /// Abort path shared by the task, the request phase, direct aborts and
    /// recovery. When a transfer has to be cleaned up the intent is persisted
    /// first, so a crash mid-cleanup is finished on restart.
    async fn finish_abort(&self, item: &mut MediaItem) {
        info!(item_id = %item.id, "Aborting acquisition");

        if let Some(current) = item.acquisition.current_candidate.clone() {
            item.acquisition.abort_requested = true;
            self.persist(item).await;

            let transfer_id = item.acquisition.backend_transfer_id.clone();
            self.cleanup_attempt(&current, transfer_id.as_deref()).await;
        }

        item.acquisition.clear_for_abort();
        self.transition(item, AcquisitionState::Aborted);
        self.persist(item).await;
        self.notifier.dispatch(NotificationEvent::DownloadAborted {
            item_id: item.id.clone(),
            title: item.title(),
            timestamp: Utc::now(),
        });
    }

    /// Best-effort removal of an attempt's transfer and partial data.
    async fn cleanup_attempt(&self, attempt: &Candidate, transfer_id: Option<&str>) {
        if let Err(e) = self.backend.remove(attempt, transfer_id, true).await {
            debug!(candidate = %attempt.name, error = %e, "Backend cleanup failed");
        }
        if let Some(dir) = &attempt.temp_dir {
            self.publisher.discard(dir).await;
        }
    }

    fn transition(&self, item: &mut MediaItem, state: AcquisitionState) {
        if let Err(e) = item.set_state(state) {
            error!(item_id = %item.id, error = %e, "Rejected state change");
        }
    }

    async fn persist(&self, item: &mut MediaItem) {
        item.touch();
        if let Err(e) = self.repo.save_item(item).await {
            error!(item_id = %item.id, error = %e, "Failed to persist item");
        }
    }

    /// Cancel `item_id`'s acquisition.
    ///
    /// A running task is signalled and performs the cleanup itself. Without
    /// a task, items in `Pending`, `Downloading` or `Downloaded` are reset
    /// directly. Aborting twice is harmless.
    #[instrument(skip(self))]
    pub async fn abort_acquisition(self: &Arc<Self>, item_id: &str) -> Result<AbortOutcome> {
        if self.registry.cancel(item_id) {
            debug!("Signalled running task");
            return Ok(AbortOutcome::Signalled);
        }

        let Some(_lease) = self.registry.try_reserve(item_id) else {
            // Something reserved the item between the two calls.
            self.registry.cancel(item_id);
            return Ok(AbortOutcome::Signalled);
        };

        let mut item = self.repo.get_item(item_id).await?;
        match item.state() {
            AcquisitionState::Pending
            | AcquisitionState::Downloading
            | AcquisitionState::Downloaded => {
                self.finish_abort(&mut item).await;
                Ok(AbortOutcome::Aborted)
            }
            state => Ok(AbortOutcome::NoOp(state)),
        }
    }

    /// Reset a `Failed` or `Aborted` item to `Idle` with a clean history so
    /// the poll loop picks it up again.
    #[instrument(skip(self))]
    pub async fn retry_failed(self: &Arc<Self>, item_id: &str) -> Result<MediaItem> {
        let Some(_lease) = self.registry.try_reserve(item_id) else {
            return Err(Error::validation(format!(
                "item {} has a running acquisition",
                item_id
            )));
        };

        let mut item = self.repo.get_item(item_id).await?;
        match item.state() {
            AcquisitionState::Failed | AcquisitionState::Aborted => {
                item.acquisition.clear_for_abort();
                item.acquisition.last_error = None;
                item.set_state(AcquisitionState::Idle)?;
                self.repo.save_item(&item).await?;
                info!("Item reset for retry");
                Ok(item)
            }
            state => Err(Error::validation(format!(
                "cannot retry item {} in state {}",
                item_id, state
            ))),
        }
    }
}
