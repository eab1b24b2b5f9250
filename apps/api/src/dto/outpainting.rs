use lumora_domain::OutpaintingJobView;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for outpainting job submission.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-outpainting-job-request.ts"
)]
pub struct CreateOutpaintingJobRequest {
    pub name: Option<String>,
    pub prompt: String,
    pub image_url: String,
    pub picture_id: Option<i64>,
}

/// Identifier of an accepted outpainting job.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-outpainting-job-response.ts"
)]
pub struct CreateOutpaintingJobResponse {
    pub job_id: i64,
}

/// API representation of an outpainting job.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/outpainting-job-response.ts"
)]
pub struct OutpaintingJobResponse {
    pub id: i64,
    pub name: String,
    pub original_image_url: String,
    pub expanded_image_url: Option<String>,
    pub analysis: Option<String>,
    pub exec_message: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OutpaintingJobView> for OutpaintingJobResponse {
    fn from(value: OutpaintingJobView) -> Self {
        Self {
            id: value.id.as_i64(),
            name: value.name,
            original_image_url: value.original_image_url,
            expanded_image_url: value.expanded_image_url,
            analysis: value.analysis,
            exec_message: value.exec_message,
            status: value.status.as_str().to_owned(),
            created_at: value.created_at.to_rfc3339(),
            updated_at: value.updated_at.to_rfc3339(),
        }
    }
}
