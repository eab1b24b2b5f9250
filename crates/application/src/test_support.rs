use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumora_core::{AccountRole, AppError, AppResult, JobId, UserId, UserIdentity};
use lumora_domain::{JobTransition, NewOutpaintingJob, OutpaintingJob, OutpaintingJobStatus};
use tokio::sync::Mutex;

use crate::{DeadLetter, DeadLetterReason, JobQueue, OutpaintingJobRepository, QueueDelivery};

pub(crate) fn user_id(raw: i64) -> UserId {
    UserId::new(raw).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn job_id(raw: i64) -> JobId {
    JobId::new(raw).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn identity(raw: i64) -> UserIdentity {
    UserIdentity::new(user_id(raw), format!("user-{raw}"), AccountRole::User)
}

#[derive(Default)]
pub(crate) struct FakeJobRepository {
    pub(crate) jobs: Mutex<HashMap<JobId, OutpaintingJob>>,
    pub(crate) transitions: Mutex<Vec<(JobId, OutpaintingJobStatus, OutpaintingJobStatus)>>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_transitions: AtomicBool,
    next_id: AtomicI64,
}

impl FakeJobRepository {
    pub(crate) async fn insert(&self, user: UserId, status: OutpaintingJobStatus) -> JobId {
        let job_id = self.allocate_id();
        let now = Utc::now();
        self.jobs.lock().await.insert(
            job_id,
            OutpaintingJob {
                id: job_id,
                user_id: user,
                name: "seeded".to_owned(),
                prompt: "expand sky".to_owned(),
                original_image_url: "https://x/y.png".to_owned(),
                picture_id: None,
                expanded_image_url: None,
                analysis: None,
                exec_message: None,
                status,
                created_at: now,
                updated_at: now,
            },
        );
        job_id
    }

    pub(crate) async fn job(&self, job_id: JobId) -> Option<OutpaintingJob> {
        self.jobs.lock().await.get(&job_id).cloned()
    }

    pub(crate) async fn backdate(&self, job_id: JobId, updated_at: DateTime<Utc>) {
        if let Some(job) = self.jobs.lock().await.get_mut(&job_id) {
            job.updated_at = updated_at;
        }
    }

    fn allocate_id(&self) -> JobId {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        JobId::new(raw).unwrap_or_else(|_| unreachable!())
    }
}

#[async_trait]
impl OutpaintingJobRepository for FakeJobRepository {
    async fn create(&self, job: NewOutpaintingJob) -> AppResult<OutpaintingJob> {
        let job_id = self.allocate_id();
        let now = Utc::now();
        let created = OutpaintingJob {
            id: job_id,
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
        self.jobs.lock().await.insert(job_id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, job_id: JobId) -> AppResult<Option<OutpaintingJob>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("database unavailable".to_owned()));
        }
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn transition(
        &self,
        job_id: JobId,
        expected: OutpaintingJobStatus,
        transition: JobTransition,
    ) -> AppResult<bool> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(AppError::Internal("connection reset by peer".to_owned()));
        }
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != expected || !expected.can_transition_to(transition.status) {
            return Ok(false);
        }

        self.transitions
            .lock()
            .await
            .push((job_id, expected, transition.status));
        job.status = transition.status;
        if transition.exec_message.is_some() {
            job.exec_message = transition.exec_message;
        }
        if transition.expanded_image_url.is_some() {
            job.expanded_image_url = transition.expanded_image_url;
        }
        if transition.analysis.is_some() {
            job.analysis = transition.analysis;
        }
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<OutpaintingJob>> {
        let mut jobs: Vec<OutpaintingJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|left, right| right.id.cmp(&left.id));
        Ok(jobs)
    }

    async fn delete(&self, job_id: JobId) -> AppResult<bool> {
        Ok(self.jobs.lock().await.remove(&job_id).is_some())
    }

    async fn reclaim_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<JobId>> {
        let mut reclaimed = Vec::new();
        for job in self.jobs.lock().await.values_mut() {
            if job.status == OutpaintingJobStatus::Running && job.updated_at < cutoff {
                job.status = OutpaintingJobStatus::Wait;
                job.exec_message = Some("reclaimed".to_owned());
                reclaimed.push(job.id);
            }
        }
        Ok(reclaimed)
    }
}

#[derive(Default)]
pub(crate) struct FakeJobQueue {
    pub(crate) ready: Mutex<VecDeque<QueueDelivery>>,
    pub(crate) dead: Mutex<VecDeque<DeadLetter>>,
    pub(crate) enqueued: Mutex<Vec<JobId>>,
    pub(crate) acked: Mutex<Vec<JobId>>,
    pub(crate) nacked: Mutex<Vec<(JobId, bool)>>,
    pub(crate) fail_enqueue: AtomicBool,
}

impl FakeJobQueue {
    pub(crate) fn delivery(job_id: JobId, delivery_count: u32) -> QueueDelivery {
        QueueDelivery {
            message_id: format!("message-{job_id}"),
            job_id,
            delivery_count,
            enqueued_at: Utc::now(),
        }
    }
}

#[async_trait]
impl JobQueue for FakeJobQueue {
    async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(AppError::Internal("broker unavailable".to_owned()));
        }
        self.enqueued.lock().await.push(job_id);
        self.ready
            .lock()
            .await
            .push_back(Self::delivery(job_id, 0));
        Ok(())
    }

    async fn receive(&self) -> AppResult<Option<QueueDelivery>> {
        Ok(self.ready.lock().await.pop_front().map(|mut delivery| {
            delivery.delivery_count += 1;
            delivery
        }))
    }

    async fn ack(&self, delivery: &QueueDelivery) -> AppResult<()> {
        self.acked.lock().await.push(delivery.job_id);
        Ok(())
    }

    async fn nack(&self, delivery: &QueueDelivery, requeue: bool) -> AppResult<()> {
        self.nacked.lock().await.push((delivery.job_id, requeue));
        if requeue {
            self.ready.lock().await.push_back(delivery.clone());
        } else {
            self.dead.lock().await.push_back(DeadLetter {
                message_id: delivery.message_id.clone(),
                job_id: delivery.job_id,
                reason: DeadLetterReason::Rejected,
                delivery_count: delivery.delivery_count,
                enqueued_at: delivery.enqueued_at,
                dead_lettered_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn receive_dead_letter(&self) -> AppResult<Option<DeadLetter>> {
        Ok(self.dead.lock().await.pop_front())
    }

    async fn expire_abandoned(&self) -> AppResult<usize> {
        Ok(0)
    }
}
