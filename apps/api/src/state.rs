use lumora_application::{
    OutpaintingService, PictureEditSessionManager, RoleAssignmentWriter, SpaceMembershipService,
};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub role_writer: RoleAssignmentWriter,
    pub space_membership_service: SpaceMembershipService,
    pub outpainting_service: OutpaintingService,
    pub picture_edit_sessions: PictureEditSessionManager,
    pub postgres_pool: PgPool,
    pub redis_client: redis::Client,
    pub internal_shared_secret: String,
}
