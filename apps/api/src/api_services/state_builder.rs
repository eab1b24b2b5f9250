use std::sync::Arc;

use lumora_application::{
    AuthorizationService, OutpaintingService, PictureEditSessionManager, RoleAssignmentWriter,
    SpaceMembershipService,
};
use lumora_core::AppError;
use lumora_infrastructure::{
    PostgresOutpaintingJobRepository, PostgresPictureCatalog, PostgresRoleAssignmentRepository,
    RedisJobQueue,
};
use sqlx::PgPool;
use tracing::info;

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::redis::build_redis_client;

/// Wires adapters into services and starts the role writer.
///
/// The role graph is loaded before any request is served.
pub async fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = build_redis_client(config.redis_url.as_str())?;

    let authorization_service =
        AuthorizationService::new(Arc::new(PostgresRoleAssignmentRepository::new(pool.clone())));
    authorization_service.initialize().await?;
    let role_writer = RoleAssignmentWriter::start(authorization_service.clone(), config.role_writer);

    let job_queue = RedisJobQueue::connect(
        redis_client.clone(),
        config.job_queue.key_prefix.clone(),
        config.job_queue.channel_pool_size,
        config.job_queue.policy,
    )
    .await?;
    let outpainting_service = OutpaintingService::new(
        Arc::new(PostgresOutpaintingJobRepository::new(pool.clone())),
        Arc::new(job_queue),
    );

    let picture_edit_sessions = PictureEditSessionManager::new(
        Arc::new(PostgresPictureCatalog::new(pool.clone())),
        authorization_service.clone(),
    );

    info!("application services initialized");

    Ok(AppState {
        space_membership_service: SpaceMembershipService::new(
            authorization_service.clone(),
            role_writer.clone(),
        ),
        role_writer,
        outpainting_service,
        picture_edit_sessions,
        postgres_pool: pool,
        redis_client,
        internal_shared_secret: config.internal_shared_secret.clone(),
    })
}
