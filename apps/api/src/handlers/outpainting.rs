use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lumora_application::SubmitOutpaintingJob;
use lumora_core::{JobId, PictureId, UserIdentity};

use crate::dto::{CreateOutpaintingJobRequest, CreateOutpaintingJobResponse, OutpaintingJobResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_outpainting_job_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateOutpaintingJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateOutpaintingJobResponse>)> {
    let picture_id = payload.picture_id.map(PictureId::new).transpose()?;
    let job_id = state
        .outpainting_service
        .submit(
            &user,
            SubmitOutpaintingJob {
                name: payload.name,
                prompt: payload.prompt,
                image_url: payload.image_url,
                picture_id,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateOutpaintingJobResponse {
            job_id: job_id.as_i64(),
        }),
    ))
}

pub async fn list_outpainting_jobs_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<OutpaintingJobResponse>>> {
    let jobs = state
        .outpainting_service
        .list(&user)
        .await?
        .into_iter()
        .map(OutpaintingJobResponse::from)
        .collect();

    Ok(Json(jobs))
}

pub async fn get_outpainting_job_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<OutpaintingJobResponse>> {
    let job = state
        .outpainting_service
        .get(&user, JobId::new(job_id)?)
        .await?;

    Ok(Json(OutpaintingJobResponse::from(job)))
}

pub async fn delete_outpainting_job_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(job_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .outpainting_service
        .delete(&user, JobId::new(job_id)?)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
