use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumora_application::OutpaintingJobRepository;
use lumora_core::{AppResult, JobId, UserId};
use lumora_domain::{JobTransition, NewOutpaintingJob, OutpaintingJob, OutpaintingJobStatus};
use tokio::sync::Mutex;

/// In-process outpainting job store for local runs and tests.
#[derive(Default)]
pub struct InMemoryOutpaintingJobRepository {
    state: Mutex<JobTable>,
}

#[derive(Default)]
struct JobTable {
    jobs: BTreeMap<JobId, OutpaintingJob>,
    last_id: i64,
}

impl InMemoryOutpaintingJobRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutpaintingJobRepository for InMemoryOutpaintingJobRepository {
    async fn create(&self, job: NewOutpaintingJob) -> AppResult<OutpaintingJob> {
        let mut table = self.state.lock().await;
        table.last_id += 1;
        let now = Utc::now();
        let created = OutpaintingJob {
            id: JobId::new(table.last_id)?,
            user_id: job.user_id,
            name: job.name,
            prompt: job.prompt,
            original_image_url: job.original_image_url,
            picture_id: job.picture_id,
            expanded_image_url: None,
            analysis: None,
            exec_message: None,
            status: OutpaintingJobStatus::Wait,
            created_at: now,
            updated_at: now,
        };
        table.jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, job_id: JobId) -> AppResult<Option<OutpaintingJob>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn transition(
        &self,
        job_id: JobId,
        expected: OutpaintingJobStatus,
        transition: JobTransition,
    ) -> AppResult<bool> {
        let mut table = self.state.lock().await;
        let Some(job) = table.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != expected || !expected.can_transition_to(transition.status) {
            return Ok(false);
        }

        job.status = transition.status;
        job.exec_message = transition.exec_message.or(job.exec_message.take());
        job.expanded_image_url = transition.expanded_image_url.or(job.expanded_image_url.take());
        job.analysis = transition.analysis.or(job.analysis.take());
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<OutpaintingJob>> {
        Ok(self
            .state
            .lock()
            .await
            .jobs
            .values()
            .rev()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, job_id: JobId) -> AppResult<bool> {
        Ok(self.state.lock().await.jobs.remove(&job_id).is_some())
    }

    async fn reclaim_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<JobId>> {
        let mut table = self.state.lock().await;
        let now = Utc::now();
        let mut reclaimed = Vec::new();
        for job in table.jobs.values_mut() {
            if job.status == OutpaintingJobStatus::Running && job.updated_at < cutoff {
                job.status = OutpaintingJobStatus::Wait;
                job.exec_message = Some("reclaimed after stale running state".to_owned());
                job.updated_at = now;
                reclaimed.push(job.id);
            }
        }
        Ok(reclaimed)
    }
}
