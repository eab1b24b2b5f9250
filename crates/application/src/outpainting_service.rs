use std::sync::Arc;

use lumora_core::{AppError, AppResult, JobId, NonEmptyString, PictureId, UserIdentity};
use lumora_domain::{JobTransition, NewOutpaintingJob, OutpaintingJobStatus, OutpaintingJobView};
use tracing::{info, warn};
use url::Url;

use crate::{JobQueue, OutpaintingJobRepository};

/// Execution message stored when a job could not be published.
pub const ENQUEUE_FAILED_MESSAGE: &str = "queue publish failed, awaiting retry";

const MAX_PROMPT_LENGTH: usize = 2000;

/// Input for submitting an outpainting job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutpaintingJob {
    /// Optional human readable name; defaults to a generated one.
    pub name: Option<String>,
    /// Prompt passed to the model.
    pub prompt: String,
    /// Absolute http(s) reference to the source image.
    pub image_url: String,
    /// Picture the source image belongs to.
    pub picture_id: Option<PictureId>,
}

/// Producer-side use-cases for outpainting jobs.
#[derive(Clone)]
pub struct OutpaintingService {
    repository: Arc<dyn OutpaintingJobRepository>,
    queue: Arc<dyn JobQueue>,
}

impl OutpaintingService {
    /// Creates the service.
    #[must_use]
    pub fn new(repository: Arc<dyn OutpaintingJobRepository>, queue: Arc<dyn JobQueue>) -> Self {
        Self { repository, queue }
    }

    /// Creates a job in `wait` status and publishes it to the queue.
    ///
    /// A publish failure leaves the job in `wait` with a diagnostic message
    /// and still returns its id.
    pub async fn submit(&self, user: &UserIdentity, input: SubmitOutpaintingJob) -> AppResult<JobId> {
        let prompt = NonEmptyString::new(input.prompt.trim())?;
        if prompt.as_str().chars().count() > MAX_PROMPT_LENGTH {
            return Err(AppError::Validation(format!(
                "prompt must be at most {MAX_PROMPT_LENGTH} characters"
            )));
        }
        let image_url = validate_image_url(&input.image_url)?;
        let name = match input.name {
            Some(name) => String::from(NonEmptyString::new(name.trim())?),
            None => default_job_name(&image_url),
        };

        let job = self
            .repository
            .create(NewOutpaintingJob {
                user_id: user.user_id(),
                name,
                prompt: prompt.into(),
                original_image_url: image_url.to_string(),
                picture_id: input.picture_id,
            })
            .await?;

        if let Err(error) = self.queue.enqueue(job.id).await {
            warn!(job_id = %job.id, error = %error, "failed to publish outpainting job");
            self.repository
                .transition(
                    job.id,
                    OutpaintingJobStatus::Wait,
                    JobTransition::note(OutpaintingJobStatus::Wait, ENQUEUE_FAILED_MESSAGE),
                )
                .await?;
            return Ok(job.id);
        }

        info!(job_id = %job.id, user_id = %user.user_id(), "outpainting job submitted");
        Ok(job.id)
    }

    /// Lists the caller's jobs, newest first.
    pub async fn list(&self, user: &UserIdentity) -> AppResult<Vec<OutpaintingJobView>> {
        Ok(self
            .repository
            .list_by_user(user.user_id())
            .await?
            .into_iter()
            .map(OutpaintingJobView::from)
            .collect())
    }

    /// Returns one of the caller's jobs.
    pub async fn get(&self, user: &UserIdentity, job_id: JobId) -> AppResult<OutpaintingJobView> {
        let job = self
            .repository
            .find_by_id(job_id)
            .await?
            .filter(|job| job.user_id == user.user_id() || user.is_admin())
            .ok_or_else(|| AppError::NotFound(format!("outpainting job '{job_id}' not found")))?;

        Ok(job.into())
    }

    /// Deletes a job owned by the caller; administrators may delete any job.
    pub async fn delete(&self, user: &UserIdentity, job_id: JobId) -> AppResult<()> {
        let job = self
            .repository
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("outpainting job '{job_id}' not found")))?;

        if job.user_id != user.user_id() && !user.is_admin() {
            return Err(AppError::Forbidden(format!(
                "outpainting job '{job_id}' belongs to another user"
            )));
        }

        if !self.repository.delete(job_id).await? {
            return Err(AppError::NotFound(format!(
                "outpainting job '{job_id}' not found"
            )));
        }

        info!(job_id = %job_id, user_id = %user.user_id(), "outpainting job deleted");
        Ok(())
    }
}

fn validate_image_url(value: &str) -> AppResult<Url> {
    let url = Url::parse(value.trim())
        .map_err(|error| AppError::Validation(format!("invalid image url '{value}': {error}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "image url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}

fn default_job_name(image_url: &Url) -> String {
    let file_name = image_url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("image");

    format!("outpaint {file_name}")
}

#[cfg(test)]
mod tests;
