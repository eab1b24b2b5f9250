use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lumora_core::AppResult;
use lumora_domain::{JobTransition, OutpaintingJob, OutpaintingJobStatus, parse_outpainting_output};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    DeadLetter, InferenceClient, InferenceError, JobQueue, OutpaintingJobRepository,
    OutpaintingPrompt, QueueDelivery,
};

mod pool;

use pool::JobDispatcher;

/// Runtime settings for the outpainting worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutpaintingWorkerConfig {
    /// Stable identifier written into execution messages and logs.
    pub worker_id: String,
    /// Jobs processed concurrently.
    pub concurrency: usize,
    /// Accepted deliveries allowed to wait for a free slot.
    pub backlog: usize,
    /// Idle delay between empty queue polls.
    pub poll_interval: Duration,
    /// Age after which a `running` job is considered orphaned; `None` disables reclaim.
    pub stale_running_after: Option<Duration>,
    /// Delay between maintenance sweeps.
    pub sweep_interval: Duration,
}

impl Default for OutpaintingWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "outpainting-worker".to_owned(),
            concurrency: 4,
            backlog: 20,
            poll_interval: Duration::from_millis(500),
            stale_running_after: Some(Duration::from_secs(15 * 60)),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Result of processing one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job succeeded and the message was acknowledged.
    Completed,
    /// The job failed permanently and the message was dead-lettered.
    Failed,
    /// The message was requeued for another attempt.
    Requeued,
    /// The job was already running elsewhere; the message was acknowledged
    /// without touching the job.
    DuplicateDelivery,
    /// Nothing to do (job gone or already terminal); the message was acknowledged.
    Skipped,
}

/// Totals reported by one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// In-flight messages dead-lettered after outliving the time-to-live.
    pub expired_messages: usize,
    /// Orphaned `running` jobs reset to `wait` and re-enqueued.
    pub reclaimed_jobs: usize,
}

/// Consumer side of the outpainting pipeline.
#[derive(Clone)]
pub struct OutpaintingWorker {
    repository: Arc<dyn OutpaintingJobRepository>,
    queue: Arc<dyn JobQueue>,
    inference: Arc<dyn InferenceClient>,
    config: Arc<OutpaintingWorkerConfig>,
}

impl OutpaintingWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        repository: Arc<dyn OutpaintingJobRepository>,
        queue: Arc<dyn JobQueue>,
        inference: Arc<dyn InferenceClient>,
        config: OutpaintingWorkerConfig,
    ) -> Self {
        Self {
            repository,
            queue,
            inference,
            config: Arc::new(config),
        }
    }

    /// Consumes the queue until `shutdown` flips to `true`.
    ///
    /// The dead-letter consumer and maintenance sweep run alongside. On
    /// shutdown consumption stops and already accepted deliveries finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let dispatcher = JobDispatcher::start(
            self.clone(),
            self.config.concurrency,
            self.config.backlog,
        );
        let dead_letters = tokio::spawn(self.clone().run_dead_letter_loop(shutdown.clone()));
        let maintenance = tokio::spawn(self.clone().run_maintenance_loop(shutdown.clone()));

        info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            backlog = self.config.backlog,
            "outpainting worker started"
        );

        while !*shutdown.borrow() {
            let consumed = dispatcher.has_capacity() && self.consume_next(&dispatcher).await;
            if !consumed && !idle(&mut shutdown, self.config.poll_interval).await {
                break;
            }
        }

        dispatcher.close().await;
        let _ = dead_letters.await;
        let _ = maintenance.await;
        info!(worker_id = %self.config.worker_id, "outpainting worker stopped");
    }

    /// Processes one delivery and settles its message.
    pub async fn process(&self, delivery: &QueueDelivery) -> JobOutcome {
        let job = match self.repository.find_by_id(delivery.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!(job_id = %delivery.job_id, "outpainting job no longer exists");
                self.ack(delivery).await;
                return JobOutcome::Skipped;
            }
            Err(error) => {
                warn!(job_id = %delivery.job_id, error = %error, "failed to load outpainting job");
                self.nack(delivery, true).await;
                return JobOutcome::Requeued;
            }
        };

        match job.status {
            OutpaintingJobStatus::Succeed | OutpaintingJobStatus::Failed => {
                debug!(job_id = %job.id, status = job.status.as_str(), "outpainting job already finished");
                self.ack(delivery).await;
                return JobOutcome::Skipped;
            }
            OutpaintingJobStatus::Running if !delivery.is_redelivery() => {
                warn!(
                    worker_id = %self.config.worker_id,
                    job_id = %job.id,
                    message_id = %delivery.message_id,
                    "duplicate delivery for running outpainting job"
                );
                self.ack(delivery).await;
                return JobOutcome::DuplicateDelivery;
            }
            OutpaintingJobStatus::Running => {
                info!(
                    job_id = %job.id,
                    delivery_count = delivery.delivery_count,
                    "retrying outpainting job"
                );
            }
            OutpaintingJobStatus::Wait => {
                let claimed = self
                    .repository
                    .transition(
                        job.id,
                        OutpaintingJobStatus::Wait,
                        JobTransition::running(format!("running on {}", self.config.worker_id)),
                    )
                    .await;
                match claimed {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %job.id, "outpainting job was claimed concurrently");
                        self.ack(delivery).await;
                        return JobOutcome::DuplicateDelivery;
                    }
                    Err(error) => {
                        warn!(job_id = %job.id, error = %error, "failed to mark outpainting job running");
                        self.nack(delivery, true).await;
                        return JobOutcome::Requeued;
                    }
                }
            }
        }

        self.execute(&job, delivery).await
    }

    /// Logs a dead-lettered message and fails its job if it never finished.
    /// Dead letters are never retried.
    pub async fn handle_dead_letter(&self, letter: &DeadLetter) {
        warn!(
            job_id = %letter.job_id,
            message_id = %letter.message_id,
            reason = letter.reason.as_str(),
            delivery_count = letter.delivery_count,
            enqueued_at = %letter.enqueued_at,
            "outpainting message dead-lettered"
        );

        let job = match self.repository.find_by_id(letter.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(error) => {
                error!(job_id = %letter.job_id, error = %error, "failed to load dead-lettered job");
                return;
            }
        };

        if !job.status.is_terminal() {
            let reason = format!(
                "message dead-lettered ({}) after {} deliveries",
                letter.reason.as_str(),
                letter.delivery_count
            );
            self.record_failure(&job, job.status, &reason).await;
        }
    }

    /// Expires abandoned in-flight messages and reclaims orphaned `running` jobs.
    pub async fn run_maintenance(&self) -> AppResult<MaintenanceReport> {
        let expired_messages = self.queue.expire_abandoned().await?;

        let mut reclaimed_jobs = 0;
        if let Some(stale_after) = self.config.stale_running_after {
            let stale_after = chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
            let reclaimed = self
                .repository
                .reclaim_stale_running(Utc::now() - stale_after)
                .await?;

            for job_id in reclaimed {
                warn!(job_id = %job_id, "re-enqueueing orphaned outpainting job");
                self.queue.enqueue(job_id).await?;
                reclaimed_jobs += 1;
            }
        }

        Ok(MaintenanceReport {
            expired_messages,
            reclaimed_jobs,
        })
    }

    async fn consume_next(&self, dispatcher: &JobDispatcher) -> bool {
        let delivery = match self.queue.receive().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return false,
            Err(error) => {
                warn!(worker_id = %self.config.worker_id, error = %error, "failed to receive from job queue");
                return false;
            }
        };

        if let Err(delivery) = dispatcher.try_dispatch(delivery) {
            debug!(job_id = %delivery.job_id, "worker pool saturated; requeueing delivery");
            self.nack(&delivery, true).await;
            return false;
        }

        true
    }

    async fn execute(&self, job: &OutpaintingJob, delivery: &QueueDelivery) -> JobOutcome {
        let request = OutpaintingPrompt {
            prompt: job.prompt.clone(),
            image_url: job.original_image_url.clone(),
        };

        let parsed = self
            .inference
            .complete(&request)
            .await
            .and_then(|output| {
                parse_outpainting_output(&output).ok_or_else(|| {
                    InferenceError::permanent("response parsing failed: no labeled fields in model output")
                })
            });

        match parsed {
            Ok(result) => {
                match self
                    .repository
                    .transition(
                        job.id,
                        OutpaintingJobStatus::Running,
                        JobTransition::succeeded(result),
                    )
                    .await
                {
                    Ok(true) => {
                        info!(job_id = %job.id, "outpainting job succeeded");
                        self.ack(delivery).await;
                        JobOutcome::Completed
                    }
                    Ok(false) => {
                        warn!(job_id = %job.id, "outpainting job left running state before completion");
                        self.ack(delivery).await;
                        JobOutcome::Skipped
                    }
                    Err(error) => {
                        error!(job_id = %job.id, error = %error, "failed to persist outpainting result");
                        self.nack(delivery, true).await;
                        JobOutcome::Requeued
                    }
                }
            }
            Err(error) if error.is_recoverable() => {
                warn!(
                    job_id = %job.id,
                    delivery_count = delivery.delivery_count,
                    error = %error,
                    "recoverable outpainting failure; requeueing"
                );
                let note = JobTransition::note(
                    OutpaintingJobStatus::Running,
                    format!("retrying after recoverable error: {error}"),
                );
                if let Err(update_error) = self
                    .repository
                    .transition(job.id, OutpaintingJobStatus::Running, note)
                    .await
                {
                    warn!(job_id = %job.id, error = %update_error, "failed to record retry note");
                }
                self.nack(delivery, true).await;
                JobOutcome::Requeued
            }
            Err(error) => {
                warn!(job_id = %job.id, error = %error, "permanent outpainting failure");
                self.record_failure(job, OutpaintingJobStatus::Running, &error.message)
                    .await;
                self.nack(delivery, false).await;
                JobOutcome::Failed
            }
        }
    }

    async fn record_failure(&self, job: &OutpaintingJob, expected: OutpaintingJobStatus, reason: &str) {
        if let Err(error) = self
            .repository
            .transition(job.id, expected, JobTransition::failed(reason))
            .await
        {
            error!(job_id = %job.id, error = %error, "failed to mark outpainting job failed");
        }
    }

    async fn ack(&self, delivery: &QueueDelivery) {
        if let Err(error) = self.queue.ack(delivery).await {
            warn!(job_id = %delivery.job_id, error = %error, "failed to acknowledge job message");
        }
    }

    async fn nack(&self, delivery: &QueueDelivery, requeue: bool) {
        if let Err(error) = self.queue.nack(delivery, requeue).await {
            warn!(
                job_id = %delivery.job_id,
                requeue,
                error = %error,
                "failed to reject job message"
            );
        }
    }

    async fn run_dead_letter_loop(self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            match self.queue.receive_dead_letter().await {
                Ok(Some(letter)) => {
                    self.handle_dead_letter(&letter).await;
                    continue;
                }
                Ok(None) => {}
                Err(error) => warn!(error = %error, "failed to read dead-letter queue"),
            }

            if !idle(&mut shutdown, self.config.poll_interval).await {
                break;
            }
        }
    }

    async fn run_maintenance_loop(self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            match self.run_maintenance().await {
                Ok(report) if report != MaintenanceReport::default() => info!(
                    expired_messages = report.expired_messages,
                    reclaimed_jobs = report.reclaimed_jobs,
                    "outpainting maintenance sweep"
                ),
                Ok(_) => {}
                Err(error) => warn!(error = %error, "outpainting maintenance sweep failed"),
            }

            if !idle(&mut shutdown, self.config.sweep_interval).await {
                break;
            }
        }
    }
}

/// Waits for `duration`; returns `false` once shutdown was requested or the
/// shutdown sender is gone.
async fn idle(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        _ = tokio::time::sleep(duration) => !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests;
