use anyhow::Context;
use media_acquire::config::AppConfig;
use media_acquire::services::ServiceContainer;
use media_acquire::{database, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("loading configuration")?;

    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;
    logging::install_panic_hook(&config.log_dir);

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    let services = ServiceContainer::new(pool, &config).await?;
    logging_config.start_retention_cleanup(services.cancellation_token());

    let report = services.start().await?;
    tracing::info!(
        recovered = report.total(),
        "media-acquire started, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    services.shutdown().await;

    Ok(())
}
