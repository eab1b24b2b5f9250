use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for adding a space member.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/add-space-member-request.ts"
)]
pub struct AddSpaceMemberRequest {
    pub user_id: i64,
    pub role: String,
}

/// Incoming payload for changing a member's space role.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/update-space-member-request.ts"
)]
pub struct UpdateSpaceMemberRequest {
    pub role: String,
}

/// Effective permissions of the caller in one space.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/space-permissions-response.ts"
)]
pub struct SpacePermissionsResponse {
    pub space_id: i64,
    pub permissions: Vec<String>,
}
