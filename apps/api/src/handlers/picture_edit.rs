use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use lumora_core::PictureId;
use tower_sessions::Session;
use tracing::info;

use crate::auth::session_identity;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::ws_connection::WebSocketEditConnection;

/// Authorizes the caller for the picture, then upgrades to the editing socket.
///
/// Handshake failures are answered with a plain HTTP error; no socket is opened.
pub async fn picture_edit_socket_handler(
    State(state): State<AppState>,
    Path(picture_id): Path<i64>,
    session: Session,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let picture_id = PictureId::new(picture_id)?;
    let identity = session_identity(&session).await?;
    let ticket = state
        .picture_edit_sessions
        .authorize(picture_id, identity.as_ref())
        .await?;

    let sessions = state.picture_edit_sessions.clone();
    Ok(upgrade.on_upgrade(move |socket| async move {
        info!(
            picture_id = %ticket.picture_id(),
            user_id = %ticket.participant().id,
            "picture edit socket opened"
        );
        sessions
            .run_session(ticket, Arc::new(WebSocketEditConnection::new(socket)))
            .await;
    }))
}
