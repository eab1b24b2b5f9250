use axum::Router;
use axum::routing::post;

use crate::handlers;
use crate::state::AppState;

/// Role seeding hooks called by the account and space services.
pub(super) fn build_internal_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/internal/users/{user_id}/registered",
            post(handlers::internal::user_registered_handler),
        )
        .route(
            "/api/internal/spaces/{space_id}/owner",
            post(handlers::internal::space_owner_handler),
        )
}
