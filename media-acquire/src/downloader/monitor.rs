//! Transfer monitor: poll one transfer until it finishes, dies, or is cancelled.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::backend::{DownloadBackend, TransferStatus};
use crate::domain::Candidate;

/// Default polling interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// How a monitored transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The backend reports the payload complete.
    Success,
    /// The transfer stopped or its status could not be read.
    Failure(String),
    /// The cancellation token fired.
    Cancelled,
}

/// Fixed-interval status poller.
#[derive(Debug, Clone, Copy)]
pub struct TransferMonitor {
    interval: Duration,
}

impl Default for TransferMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MONITOR_INTERVAL)
    }
}

impl TransferMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspend until the transfer reaches a terminal backend state or `token`
    /// is cancelled.
    ///
    /// Cancellation is checked before every status query. A query that is
    /// already running completes first. The wait between ticks wakes early
    /// on cancellation.
    pub async fn watch(
        &self,
        backend: &dyn DownloadBackend,
        candidate: &Candidate,
        transfer_id: &str,
        token: &CancellationToken,
    ) -> MonitorOutcome {
        loop {
            if token.is_cancelled() {
                debug!(candidate = %candidate.name, "Monitor observed cancellation");
                return MonitorOutcome::Cancelled;
            }

            match backend.status(candidate, transfer_id).await {
                Ok(TransferStatus::Seeding) => return MonitorOutcome::Success,
                Ok(TransferStatus::Stopped) => {
                    return MonitorOutcome::Failure(format!(
                        "{} reports the transfer stopped",
                        backend.name()
                    ));
                }
                Ok(status) => {
                    trace!(candidate = %candidate.name, %status, "Transfer in progress");
                }
                Err(e) => return MonitorOutcome::Failure(e.to_string()),
            }

            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedStatus {
        script: Mutex<VecDeque<Result<TransferStatus>>>,
        queries: AtomicU32,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<TransferStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                queries: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DownloadBackend for ScriptedStatus {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _candidate: &Candidate) -> Result<String> {
            Ok("t".into())
        }

        async fn remove(&self, _c: &Candidate, _t: Option<&str>, _d: bool) -> Result<()> {
            Ok(())
        }

        async fn status(&self, _candidate: &Candidate, _transfer_id: &str) -> Result<TransferStatus> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Ok(TransferStatus::Downloading))
        }

        async fn is_alive(&self) -> bool {
            true
        }
    }

    fn candidate() -> Candidate {
        Candidate::new("a", "A", "magnet:a", 1)
    }

    #[tokio::test]
    async fn test_success_after_progress() {
        let backend = ScriptedStatus::new(vec![
            Ok(TransferStatus::Downloading),
            Ok(TransferStatus::Unknown),
            Ok(TransferStatus::Seeding),
        ]);
        let monitor = TransferMonitor::new(Duration::from_millis(1));

        let outcome = monitor
            .watch(&backend, &candidate(), "t", &CancellationToken::new())
            .await;

        assert_eq!(outcome, MonitorOutcome::Success);
        assert_eq!(backend.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stopped_and_query_error_are_failures() {
        let monitor = TransferMonitor::new(Duration::from_millis(1));

        let stopped = ScriptedStatus::new(vec![Ok(TransferStatus::Stopped)]);
        let outcome = monitor
            .watch(&stopped, &candidate(), "t", &CancellationToken::new())
            .await;
        assert!(matches!(outcome, MonitorOutcome::Failure(_)));

        let erroring = ScriptedStatus::new(vec![Err(crate::Error::backend("gone"))]);
        let outcome = monitor
            .watch(&erroring, &candidate(), "t", &CancellationToken::new())
            .await;
        assert!(matches!(outcome, MonitorOutcome::Failure(msg) if msg.contains("gone")));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_status_query() {
        let backend = ScriptedStatus::new(vec![]);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = TransferMonitor::default()
            .watch(&backend, &candidate(), "t", &token)
            .await;

        assert_eq!(outcome, MonitorOutcome::Cancelled);
        assert_eq!(backend.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_wakes_wait_before_next_tick() {
        let backend = Arc::new(ScriptedStatus::new(vec![]));
        let token = CancellationToken::new();
        // An interval far longer than the test timeout.
        let monitor = TransferMonitor::new(Duration::from_secs(3600));

        let task = {
            let backend = backend.clone();
            let token = token.clone();
            tokio::spawn(async move {
                monitor
                    .watch(backend.as_ref(), &candidate(), "t", &token)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, MonitorOutcome::Cancelled);
        assert_eq!(backend.queries.load(Ordering::SeqCst), 1);
    }
}
