//! Application configuration.
//!
//! Settings come from an optional JSON file named by `MEDIA_ACQUIRE_CONFIG`,
//! then individual environment variables override single fields. Every
//! section has defaults so an empty file (or no file) is valid apart from the
//! library roots, which must be given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquisition::{DEFAULT_ATTEMPT_LIMIT, SupervisorConfig};
use crate::discovery::DiscoveryConfig;
use crate::domain::LibraryRoots;
use crate::downloader::TransmissionConfig;
use crate::library::MediaCenterConfig;
use crate::notification::NotificationServiceConfig;
use crate::scheduler::SchedulerConfig;
use crate::{Error, Result};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "MEDIA_ACQUIRE_CONFIG";

const DEFAULT_DATABASE_URL: &str = "sqlite:media-acquire.db?mode=rwc";

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Whole-request timeout; 0 disables it.
    pub request_timeout_secs: u64,
    /// See [`crate::utils::http_client::apply_proxy`].
    pub proxy_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            proxy_url: None,
        }
    }
}

/// Supervision tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub attempt_limit: usize,
    pub candidate_window: usize,
    pub monitor_interval_secs: u64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
            candidate_window: crate::downloader::queue::DEFAULT_CANDIDATE_WINDOW,
            monitor_interval_secs: crate::downloader::monitor::DEFAULT_MONITOR_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Parent of the per-attempt download directories.
    pub temp_root: PathBuf,
    pub library: LibraryRoots,
    pub acquisition: AcquisitionSettings,
    pub scheduler: SchedulerConfig,
    pub http: HttpClientConfig,
    pub backend: TransmissionConfig,
    pub discovery: DiscoveryConfig,
    pub notifications: NotificationServiceConfig,
    pub media_centers: Vec<MediaCenterConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: PathBuf::from("logs"),
            temp_root: std::env::temp_dir().join("media-acquire"),
            library: LibraryRoots {
                tv: PathBuf::new(),
                movies: PathBuf::new(),
            },
            acquisition: AcquisitionSettings::default(),
            scheduler: SchedulerConfig::default(),
            http: HttpClientConfig::default(),
            backend: TransmissionConfig::default(),
            discovery: DiscoveryConfig::default(),
            notifications: NotificationServiceConfig::default(),
            media_centers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io_path("read config", path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    /// Override single fields from `lookup` (normally the environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("MEDIA_ACQUIRE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MEDIA_ACQUIRE_TEMP_ROOT") {
            self.temp_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("MEDIA_ACQUIRE_TV_ROOT") {
            self.library.tv = PathBuf::from(v);
        }
        if let Some(v) = lookup("MEDIA_ACQUIRE_MOVIES_ROOT") {
            self.library.movies = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRANSMISSION_URL") {
            self.backend.url = v;
        }
        if let Some(v) = lookup("TRANSMISSION_USERNAME") {
            self.backend.username = Some(v);
        }
        if let Some(v) = lookup("TRANSMISSION_PASSWORD") {
            self.backend.password = Some(v);
        }
        if let Some(v) = lookup("DISCOVERY_URL") {
            self.discovery.url = v;
        }
        if let Some(v) = lookup("HTTP_PROXY_URL") {
            self.http.proxy_url = Some(v);
        }
        if let Some(v) = lookup("ATTEMPT_LIMIT") {
            self.acquisition.attempt_limit = parse_number("ATTEMPT_LIMIT", &v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            self.scheduler.poll_interval_secs = parse_number("POLL_INTERVAL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.library.tv.as_os_str().is_empty() || self.library.movies.as_os_str().is_empty() {
            return Err(Error::config("library.tv and library.movies must both be set"));
        }
        if self.acquisition.candidate_window == 0 {
            return Err(Error::config("acquisition.candidate_window must be at least 1"));
        }
        if self.acquisition.monitor_interval_secs == 0 {
            return Err(Error::config("acquisition.monitor_interval_secs must be at least 1"));
        }
        if self.database_url.trim().is_empty() {
            return Err(Error::config("database_url must not be empty"));
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            attempt_limit: self.acquisition.attempt_limit,
            candidate_window: self.acquisition.candidate_window,
            monitor_interval: Duration::from_secs(self.acquisition.monitor_interval_secs),
            temp_root: self.temp_root.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
