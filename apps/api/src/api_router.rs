use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use lumora_core::AppError;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::PostgresStore;

use crate::state::AppState;
use crate::{auth, handlers, middleware};

mod cors;
mod internal;

use cors::build_cors_layer;
use internal::build_internal_routes;

pub fn build_router(
    app_state: AppState,
    frontend_url: &str,
    session_layer: SessionManagerLayer<PostgresStore>,
) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/api/outpainting/jobs",
            get(handlers::outpainting::list_outpainting_jobs_handler)
                .post(handlers::outpainting::create_outpainting_job_handler),
        )
        .route(
            "/api/outpainting/jobs/{job_id}",
            get(handlers::outpainting::get_outpainting_job_handler)
                .delete(handlers::outpainting::delete_outpainting_job_handler),
        )
        .route(
            "/api/spaces/{space_id}/permissions",
            get(handlers::spaces::space_permissions_handler),
        )
        .route(
            "/api/spaces/{space_id}/members",
            post(handlers::spaces::add_space_member_handler),
        )
        .route(
            "/api/spaces/{space_id}/members/{user_id}",
            put(handlers::spaces::update_space_member_handler)
                .delete(handlers::spaces::remove_space_member_handler),
        )
        .route_layer(from_fn(middleware::require_auth));

    // The editing socket authorizes itself before the upgrade.
    let socket_routes = Router::new().route(
        "/ws/pictures/{picture_id}/edit",
        get(handlers::picture_edit::picture_edit_socket_handler),
    );

    let internal_routes = build_internal_routes().route_layer(from_fn_with_state(
        app_state.clone(),
        middleware::require_internal_auth,
    ));

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .merge(protected_routes)
        .merge(socket_routes)
        .merge(internal_routes)
        .layer(session_layer)
        .layer(build_cors_layer(frontend_url)?)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
