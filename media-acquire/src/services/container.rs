//! Service container for dependency injection.
//!
//! The ServiceContainer builds every application service from an
//! [`AppConfig`] and owns the shared cancellation token.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::acquisition::{DownloadSupervisor, RecoveryCoordinator, RecoveryReport};
use crate::config::AppConfig;
use crate::database::repositories::{MediaItemRepository, SqlxMediaItemRepository};
use crate::discovery::{CandidateSource, HttpCandidateSource};
use crate::downloader::{DownloadBackend, TransmissionBackend};
use crate::library::LibraryPublisher;
use crate::notification::NotificationService;
use crate::scheduler::AcquisitionScheduler;
use crate::utils::{fs, http_client};

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub repository: Arc<dyn MediaItemRepository>,
    pub notifications: Arc<NotificationService>,
    pub supervisor: Arc<DownloadSupervisor>,
    pub recovery: RecoveryCoordinator,
    pub scheduler: Arc<AcquisitionScheduler>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build all services against the production adapters.
    pub async fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self> {
        info!("Initializing service container");

        fs::ensure_dir_all_with_op("create temp root", &config.temp_root).await?;

        let client = http_client::build_client(&config.http)?;

        let repository: Arc<dyn MediaItemRepository> =
            Arc::new(SqlxMediaItemRepository::new(pool.clone()));
        let backend: Arc<dyn DownloadBackend> =
            Arc::new(TransmissionBackend::new(config.backend.clone(), client.clone()));
        let discovery: Arc<dyn CandidateSource> =
            Arc::new(HttpCandidateSource::new(&config.discovery, client.clone())?);

        let notifications = Arc::new(NotificationService::with_config(
            config.notifications.clone(),
            client.clone(),
        ));

        let mut publisher = LibraryPublisher::new(config.library.clone());
        for center in &config.media_centers {
            publisher = publisher.with_media_center(center.build(client.clone()));
        }
        if config.media_centers.is_empty() {
            warn!("No media centers configured, libraries will not be refreshed");
        }

        let supervisor = DownloadSupervisor::new(
            repository.clone(),
            backend,
            discovery,
            notifications.clone(),
            Arc::new(publisher),
            config.supervisor_config(),
        );

        let recovery = RecoveryCoordinator::new(repository.clone(), supervisor.clone());

        let cancellation_token = CancellationToken::new();
        let scheduler = Arc::new(AcquisitionScheduler::with_cancellation(
            repository.clone(),
            supervisor.clone(),
            config.scheduler.clone(),
            cancellation_token.child_token(),
        ));

        info!(
            notification_channels = notifications.stats().channel_count,
            media_centers = config.media_centers.len(),
            "Service container initialized"
        );

        Ok(Self {
            pool,
            repository,
            notifications,
            supervisor,
            recovery,
            scheduler,
            cancellation_token,
        })
    }

    /// Recover interrupted work, then start the poll loop in the background.
    pub async fn start(&self) -> Result<RecoveryReport> {
        let report = self.recovery.recover_in_flight().await?;

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run().await {
                warn!(error = %e, "Scheduler stopped with an error");
            }
        });

        Ok(report)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop the poll loop and close the pool.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.pool.close().await;
    }
}
