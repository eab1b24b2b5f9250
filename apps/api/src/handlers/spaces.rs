use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lumora_core::{SpaceId, UserId, UserIdentity};
use lumora_domain::SpaceRole;

use crate::dto::{AddSpaceMemberRequest, SpacePermissionsResponse, UpdateSpaceMemberRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn space_permissions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(space_id): Path<i64>,
) -> ApiResult<Json<SpacePermissionsResponse>> {
    let space_id = SpaceId::new(space_id)?;
    let permissions = state
        .space_membership_service
        .permissions_for(&user, space_id)
        .await
        .into_iter()
        .map(|permission| permission.as_str().to_owned())
        .collect();

    Ok(Json(SpacePermissionsResponse {
        space_id: space_id.as_i64(),
        permissions,
    }))
}

pub async fn add_space_member_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(space_id): Path<i64>,
    Json(payload): Json<AddSpaceMemberRequest>,
) -> ApiResult<StatusCode> {
    state
        .space_membership_service
        .add_member(
            &user,
            SpaceId::new(space_id)?,
            UserId::new(payload.user_id)?,
            payload.role.parse::<SpaceRole>()?,
        )
        .await?;

    Ok(StatusCode::ACCEPTED)
}

pub async fn update_space_member_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path((space_id, member_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateSpaceMemberRequest>,
) -> ApiResult<StatusCode> {
    state
        .space_membership_service
        .change_member_role(
            &user,
            SpaceId::new(space_id)?,
            UserId::new(member_id)?,
            payload.role.parse::<SpaceRole>()?,
        )
        .await?;

    Ok(StatusCode::ACCEPTED)
}

pub async fn remove_space_member_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path((space_id, member_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state
        .space_membership_service
        .remove_member(&user, SpaceId::new(space_id)?, UserId::new(member_id)?)
        .await?;

    Ok(StatusCode::ACCEPTED)
}
