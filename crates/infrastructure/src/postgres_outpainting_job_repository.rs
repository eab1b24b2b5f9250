use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use lumora_application::OutpaintingJobRepository;
use lumora_core::{AppError, AppResult, JobId, PictureId, UserId};
use lumora_domain::{JobTransition, NewOutpaintingJob, OutpaintingJob, OutpaintingJobStatus};

const RECLAIMED_MESSAGE: &str = "reclaimed after stale running state";

/// PostgreSQL-backed repository for outpainting jobs.
#[derive(Clone)]
pub struct PostgresOutpaintingJobRepository {
    pool: PgPool,
}

impl PostgresOutpaintingJobRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OutpaintingJobRow {
    id: i64,
    user_id: i64,
    name: String,
    prompt: String,
    original_image_url: String,
    picture_id: Option<i64>,
    expanded_image_url: Option<String>,
    analysis: Option<String>,
    exec_message: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OutpaintingJobRow> for OutpaintingJob {
    type Error = AppError;

    fn try_from(row: OutpaintingJobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: JobId::new(row.id)?,
            user_id: UserId::new(row.user_id)?,
            name: row.name,
            prompt: row.prompt,
            original_image_url: row.original_image_url,
            picture_id: row.picture_id.map(PictureId::new).transpose()?,
            expanded_image_url: row.expanded_image_url,
            analysis: row.analysis,
            exec_message: row.exec_message,
            status: OutpaintingJobStatus::parse(row.status.as_str())?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, user_id, name, prompt, original_image_url, picture_id, \
     expanded_image_url, analysis, exec_message, status, created_at, updated_at";

#[async_trait]
impl OutpaintingJobRepository for PostgresOutpaintingJobRepository {
    async fn create(&self, job: NewOutpaintingJob) -> AppResult<OutpaintingJob> {
        let row = sqlx::query_as::<_, OutpaintingJobRow>(&format!(
            r#"
            INSERT INTO outpainting_jobs (user_id, name, prompt, original_image_url, picture_id, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.user_id.as_i64())
        .bind(job.name)
        .bind(job.prompt)
        .bind(job.original_image_url)
        .bind(job.picture_id.map(PictureId::as_i64))
        .bind(OutpaintingJobStatus::Wait.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create outpainting job: {error}")))?;

        OutpaintingJob::try_from(row)
    }

    async fn find_by_id(&self, job_id: JobId) -> AppResult<Option<OutpaintingJob>> {
        let row = sqlx::query_as::<_, OutpaintingJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM outpainting_jobs WHERE id = $1"
        ))
        .bind(job_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load outpainting job '{job_id}': {error}"))
        })?;

        row.map(OutpaintingJob::try_from).transpose()
    }

    async fn transition(
        &self,
        job_id: JobId,
        expected: OutpaintingJobStatus,
        transition: JobTransition,
    ) -> AppResult<bool> {
        if !expected.can_transition_to(transition.status) {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE outpainting_jobs
            SET status = $3,
                exec_message = COALESCE($4, exec_message),
                expanded_image_url = COALESCE($5, expanded_image_url),
                analysis = COALESCE($6, analysis),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(job_id.as_i64())
        .bind(expected.as_str())
        .bind(transition.status.as_str())
        .bind(transition.exec_message)
        .bind(transition.expanded_image_url)
        .bind(transition.analysis)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to move outpainting job '{job_id}' out of '{}': {error}",
                expected.as_str()
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<OutpaintingJob>> {
        let rows = sqlx::query_as::<_, OutpaintingJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM outpainting_jobs WHERE user_id = $1 ORDER BY id DESC LIMIT 200"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list outpainting jobs: {error}")))?;

        rows.into_iter().map(OutpaintingJob::try_from).collect()
    }

    async fn delete(&self, job_id: JobId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM outpainting_jobs WHERE id = $1")
            .bind(job_id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete outpainting job '{job_id}': {error}"))
            })?;

        Ok(result.rows_affected() == 1)
    }

    async fn reclaim_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<JobId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE outpainting_jobs
            SET status = 'wait', exec_message = $2, updated_at = NOW()
            WHERE status = 'running' AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .bind(RECLAIMED_MESSAGE)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to reclaim stale outpainting jobs: {error}"))
        })?;

        ids.into_iter().map(JobId::new).collect()
    }
}
