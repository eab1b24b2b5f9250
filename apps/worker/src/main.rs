//! Lumora outpainting worker runtime.

#![forbid(unsafe_code)]

mod worker_config;

use std::sync::Arc;

use lumora_application::OutpaintingWorker;
use lumora_core::{AppError, AppResult};
use lumora_infrastructure::{HttpInferenceClient, PostgresOutpaintingJobRepository, RedisJobQueue};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let queue = RedisJobQueue::connect(
        redis_client,
        config.queue_key_prefix.clone(),
        config.queue_channel_pool_size,
        config.queue_policy,
    )
    .await?;
    let inference = HttpInferenceClient::new(config.inference.clone()).map_err(|error| {
        AppError::Internal(format!("failed to build inference client: {error}"))
    })?;

    info!(
        worker_id = %config.worker.worker_id,
        concurrency = config.worker.concurrency,
        backlog = config.worker.backlog,
        model = %config.inference.model,
        "lumora-worker started"
    );

    let worker = OutpaintingWorker::new(
        Arc::new(PostgresOutpaintingJobRepository::new(pool)),
        Arc::new(queue),
        Arc::new(inference),
        config.worker,
    );

    let (shutdown_sender, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(error) => {
                warn!(error = %error, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_sender.send(true);
    });

    worker.run(shutdown).await;
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
