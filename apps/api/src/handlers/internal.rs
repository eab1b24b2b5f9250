use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use lumora_core::{SpaceId, UserId};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SpaceOwnerRequest {
    pub user_id: i64,
}

pub async fn user_registered_handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .space_membership_service
        .register_user(UserId::new(user_id)?);

    Ok(StatusCode::ACCEPTED)
}

pub async fn space_owner_handler(
    State(state): State<AppState>,
    Path(space_id): Path<i64>,
    Json(payload): Json<SpaceOwnerRequest>,
) -> ApiResult<StatusCode> {
    state
        .space_membership_service
        .grant_space_owner(UserId::new(payload.user_id)?, SpaceId::new(space_id)?);

    Ok(StatusCode::ACCEPTED)
}
