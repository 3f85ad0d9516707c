//! Logging setup with a reloadable filter and daily rolling files.
//!
//! This module provides:
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Console and daily-rotated file output with local timezone timestamps
//! - Log file retention cleanup (deletes logs older than 7 days)
//! - A panic hook that survives `panic = "abort"` builds

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::utils::fs;

mod panic;

pub use panic::install_panic_hook;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "media_acquire=info,sqlx=warn,reqwest=warn";

/// Log file name; the appender adds a `.YYYY-MM-DD` suffix.
pub(crate) const LOG_FILE_NAME: &str = "media-acquire.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle onto the installed subscriber.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// Current filter directive.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive, e.g. `media_acquire=debug,sqlx=warn`.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Delete expired log files now and then once a day until cancelled.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to cleanup old logs");
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete rotated log files older than `retention_days`. Returns how many
/// were removed.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{}.", LOG_FILE_NAME);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&prefix))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_LOG_FILTER`]. Keep the returned
/// guard alive for the lifetime of the process or buffered file output is lost.
pub fn init_logging(log_dir: &Path) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig {
        handle: filter_handle,
        log_dir: log_dir.to_path_buf(),
    });

    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("media_acquire=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_set_filter_reloads_and_rejects_bad_directives() {
        let (_layer, handle) =
            reload::Layer::<EnvFilter, tracing_subscriber::Registry>::new(EnvFilter::new(DEFAULT_LOG_FILTER));
        let config = LoggingConfig {
            handle,
            log_dir: PathBuf::from("logs"),
        };
        assert!(config.get_filter().contains("media_acquire=info"));

        config.set_filter("media_acquire=debug").unwrap();
        assert!(config.get_filter().contains("media_acquire=debug"));

        assert!(config.set_filter("media_acquire=loudest").is_err());
        assert!(config.get_filter().contains("media_acquire=debug"));
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_expired_rotated_logs() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("media-acquire.log.2000-01-01");
        let today = dir
            .path()
            .join(format!("media-acquire.log.{}", Utc::now().format("%Y-%m-%d")));
        let unrelated = dir.path().join("other.log.2000-01-01");
        let undated = dir.path().join("media-acquire.log.backup");
        for path in [&old, &today, &unrelated, &undated] {
            tokio::fs::write(path, b"x").await.unwrap();
        }

        let removed = cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
        assert!(undated.exists());
    }
}
