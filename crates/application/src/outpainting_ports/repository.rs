use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumora_core::{AppResult, JobId, UserId};
use lumora_domain::{JobTransition, NewOutpaintingJob, OutpaintingJob, OutpaintingJobStatus};

/// Repository port for outpainting jobs.
#[async_trait]
pub trait OutpaintingJobRepository: Send + Sync {
    /// Inserts a job in `wait` status.
    async fn create(&self, job: NewOutpaintingJob) -> AppResult<OutpaintingJob>;

    /// Finds a job by id.
    async fn find_by_id(&self, job_id: JobId) -> AppResult<Option<OutpaintingJob>>;

    /// Applies the transition only while the job is still in `expected`
    /// status. Returns whether a row was updated.
    async fn transition(
        &self,
        job_id: JobId,
        expected: OutpaintingJobStatus,
        transition: JobTransition,
    ) -> AppResult<bool>;

    /// Lists a user's jobs, newest first.
    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<OutpaintingJob>>;

    /// Deletes a job. Returns whether a row was removed.
    async fn delete(&self, job_id: JobId) -> AppResult<bool>;

    /// Resets jobs stuck in `running` since before `cutoff` back to `wait`
    /// and returns their ids.
    async fn reclaim_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<JobId>>;
}
