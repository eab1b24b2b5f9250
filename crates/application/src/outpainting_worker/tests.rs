use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lumora_domain::OutpaintingJobStatus;
use tokio::sync::{Mutex, Semaphore, watch};

use super::pool::JobDispatcher;
use super::{JobOutcome, OutpaintingWorker, OutpaintingWorkerConfig};
use crate::test_support::{FakeJobQueue, FakeJobRepository, identity, job_id, user_id};
use crate::{
    DeadLetter, DeadLetterReason, InferenceClient, InferenceError, JobQueue, OutpaintingPrompt,
    OutpaintingService, SubmitOutpaintingJob,
};

const GOOD_OUTPUT: &str =
    "Result URL: https://cdn.example.com/expanded.png\nAnalysis: open sky over a calm sea";

#[derive(Default)]
struct ScriptedInference {
    responses: Mutex<VecDeque<Result<String, InferenceError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedInference {
    fn answering(responses: Vec<Result<String, InferenceError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, _request: &OutpaintingPrompt) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(GOOD_OUTPUT.to_owned()))
    }
}

fn worker_with(
    repository: Arc<FakeJobRepository>,
    queue: Arc<FakeJobQueue>,
    inference: Arc<ScriptedInference>,
) -> OutpaintingWorker {
    OutpaintingWorker::new(
        repository,
        queue,
        inference,
        OutpaintingWorkerConfig {
            worker_id: "test-worker".to_owned(),
            poll_interval: Duration::from_millis(5),
            sweep_interval: Duration::from_millis(5),
            ..OutpaintingWorkerConfig::default()
        },
    )
}

#[tokio::test]
async fn waiting_job_runs_to_success_and_is_acknowledged() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let worker = worker_with(repository.clone(), queue.clone(), ScriptedInference::answering(vec![]));
    let job_id = repository.insert(user_id(7), OutpaintingJobStatus::Wait).await;

    let outcome = worker.process(&FakeJobQueue::delivery(job_id, 1)).await;

    assert_eq!(outcome, JobOutcome::Completed);
    let job = repository.job(job_id).await;
    assert_eq!(job.as_ref().map(|job| job.status), Some(OutpaintingJobStatus::Succeed));
    assert_eq!(
        job.as_ref().and_then(|job| job.expanded_image_url.as_deref()),
        Some("https://cdn.example.com/expanded.png")
    );
    assert_eq!(
        job.and_then(|job| job.analysis),
        Some("open sky over a calm sea".to_owned())
    );
    assert_eq!(
        *repository.transitions.lock().await,
        vec![
            (job_id, OutpaintingJobStatus::Wait, OutpaintingJobStatus::Running),
            (job_id, OutpaintingJobStatus::Running, OutpaintingJobStatus::Succeed),
        ]
    );
    assert_eq!(*queue.acked.lock().await, vec![job_id]);
}

#[tokio::test]
async fn server_errors_requeue_and_keep_the_job_running() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![Err(InferenceError::classified(
        "API returned error: 503 - overloaded",
    ))]);
    let worker = worker_with(repository.clone(), queue.clone(), inference);
    let job_id = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;

    let outcome = worker.process(&FakeJobQueue::delivery(job_id, 1)).await;

    assert_eq!(outcome, JobOutcome::Requeued);
    assert_eq!(
        repository.job(job_id).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Running)
    );
    assert_eq!(*queue.nacked.lock().await, vec![(job_id, true)]);
    assert!(queue.acked.lock().await.is_empty());
}

#[tokio::test]
async fn redelivered_running_job_is_retried_until_success() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![Err(InferenceError::classified(
        "API call failed: connection reset by peer",
    ))]);
    let worker = worker_with(repository.clone(), queue.clone(), inference.clone());
    let job_id = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;

    assert_eq!(
        worker.process(&FakeJobQueue::delivery(job_id, 1)).await,
        JobOutcome::Requeued
    );
    assert_eq!(
        worker.process(&FakeJobQueue::delivery(job_id, 2)).await,
        JobOutcome::Completed
    );
    assert_eq!(inference.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        repository.job(job_id).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Succeed)
    );
}

#[tokio::test]
async fn client_errors_fail_the_job_without_requeue() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![Err(InferenceError::classified(
        "API returned error: 400 - unsupported image",
    ))]);
    let worker = worker_with(repository.clone(), queue.clone(), inference);
    let job_id = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;

    let outcome = worker.process(&FakeJobQueue::delivery(job_id, 1)).await;

    assert_eq!(outcome, JobOutcome::Failed);
    let job = repository.job(job_id).await;
    assert_eq!(job.as_ref().map(|job| job.status), Some(OutpaintingJobStatus::Failed));
    assert_eq!(
        job.and_then(|job| job.exec_message),
        Some("API returned error: 400 - unsupported image".to_owned())
    );
    assert_eq!(*queue.nacked.lock().await, vec![(job_id, false)]);
    assert_eq!(queue.dead.lock().await.len(), 1);
}

#[tokio::test]
async fn unlabeled_model_output_is_a_permanent_failure() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![Ok("Sorry, I can't do that.".to_owned())]);
    let worker = worker_with(repository.clone(), queue.clone(), inference);
    let job_id = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;

    assert_eq!(
        worker.process(&FakeJobQueue::delivery(job_id, 1)).await,
        JobOutcome::Failed
    );
    assert_eq!(*queue.nacked.lock().await, vec![(job_id, false)]);
}

#[tokio::test]
async fn first_delivery_of_running_job_is_a_duplicate() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![]);
    let worker = worker_with(repository.clone(), queue.clone(), inference.clone());
    let job_id = repository.insert(user_id(1), OutpaintingJobStatus::Running).await;

    let outcome = worker.process(&FakeJobQueue::delivery(job_id, 1)).await;

    assert_eq!(outcome, JobOutcome::DuplicateDelivery);
    assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
    assert_eq!(*queue.acked.lock().await, vec![job_id]);
    assert!(repository.transitions.lock().await.is_empty());
}

#[tokio::test]
async fn finished_jobs_are_never_restarted() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![]);
    let worker = worker_with(repository.clone(), queue.clone(), inference.clone());
    let succeeded = repository.insert(user_id(1), OutpaintingJobStatus::Succeed).await;
    let failed = repository.insert(user_id(1), OutpaintingJobStatus::Failed).await;

    for job_id in [succeeded, failed] {
        for delivery_count in [1, 3] {
            assert_eq!(
                worker
                    .process(&FakeJobQueue::delivery(job_id, delivery_count))
                    .await,
                JobOutcome::Skipped
            );
        }
    }

    assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
    assert!(repository.transitions.lock().await.is_empty());
}

#[tokio::test]
async fn missing_job_is_acknowledged_and_read_errors_requeue() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let worker = worker_with(repository.clone(), queue.clone(), ScriptedInference::answering(vec![]));
    let missing_job = job_id(99);

    assert_eq!(
        worker.process(&FakeJobQueue::delivery(missing_job, 1)).await,
        JobOutcome::Skipped
    );

    repository.fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(
        worker.process(&FakeJobQueue::delivery(missing_job, 1)).await,
        JobOutcome::Requeued
    );
    assert_eq!(*queue.nacked.lock().await, vec![(missing_job, true)]);
}

#[tokio::test]
async fn claim_errors_requeue_and_leave_the_job_waiting() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let inference = ScriptedInference::answering(vec![]);
    let worker = worker_with(repository.clone(), queue.clone(), inference.clone());
    let job_id = repository.insert(user_id(4), OutpaintingJobStatus::Wait).await;

    repository.fail_transitions.store(true, Ordering::SeqCst);
    let outcome = worker.process(&FakeJobQueue::delivery(job_id, 1)).await;

    assert_eq!(outcome, JobOutcome::Requeued);
    assert_eq!(
        repository.job(job_id).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Wait)
    );
    assert!(queue.acked.lock().await.is_empty());
    assert_eq!(*queue.nacked.lock().await, vec![(job_id, true)]);
    assert_eq!(inference.calls.load(Ordering::SeqCst), 0);

    repository.fail_transitions.store(false, Ordering::SeqCst);
    let Some(redelivery) = queue.receive().await.ok().flatten() else {
        panic!("claim failure should leave the message queued");
    };
    assert_eq!(worker.process(&redelivery).await, JobOutcome::Completed);
}

#[tokio::test]
async fn dead_letters_fail_unfinished_jobs_only() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let worker = worker_with(repository.clone(), queue.clone(), ScriptedInference::answering(vec![]));
    let running = repository.insert(user_id(1), OutpaintingJobStatus::Running).await;
    let finished = repository.insert(user_id(1), OutpaintingJobStatus::Succeed).await;

    for job_id in [running, finished] {
        worker
            .handle_dead_letter(&DeadLetter {
                message_id: format!("message-{job_id}"),
                job_id,
                reason: DeadLetterReason::DeliveryLimit,
                delivery_count: 10,
                enqueued_at: Utc::now(),
                dead_lettered_at: Utc::now(),
            })
            .await;
    }

    let running_job = repository.job(running).await;
    assert_eq!(
        running_job.as_ref().map(|job| job.status),
        Some(OutpaintingJobStatus::Failed)
    );
    assert!(
        running_job
            .and_then(|job| job.exec_message)
            .is_some_and(|message| message.contains("delivery_limit"))
    );
    assert_eq!(
        repository.job(finished).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Succeed)
    );
}

#[tokio::test]
async fn maintenance_reclaims_orphaned_running_jobs() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let worker = worker_with(repository.clone(), queue.clone(), ScriptedInference::answering(vec![]));
    let orphaned = repository.insert(user_id(1), OutpaintingJobStatus::Running).await;
    let fresh = repository.insert(user_id(1), OutpaintingJobStatus::Running).await;
    repository
        .backdate(orphaned, Utc::now() - chrono::Duration::hours(1))
        .await;

    let report = worker.run_maintenance().await;

    assert_eq!(report.ok().map(|report| report.reclaimed_jobs), Some(1));
    assert_eq!(
        repository.job(orphaned).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Wait)
    );
    assert_eq!(
        repository.job(fresh).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Running)
    );
    assert_eq!(*queue.enqueued.lock().await, vec![orphaned]);
}

#[tokio::test]
async fn saturated_pool_hands_deliveries_back() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let gate = Arc::new(Semaphore::new(0));
    let inference = Arc::new(ScriptedInference {
        gate: Some(gate.clone()),
        ..ScriptedInference::default()
    });
    let worker = worker_with(repository.clone(), queue.clone(), inference.clone());
    let dispatcher = JobDispatcher::start(worker, 1, 1);

    let first = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;
    let second = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;
    let third = repository.insert(user_id(1), OutpaintingJobStatus::Wait).await;

    assert!(dispatcher.try_dispatch(FakeJobQueue::delivery(first, 1)).is_ok());
    for _ in 0..200 {
        if inference.calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(dispatcher.try_dispatch(FakeJobQueue::delivery(second, 1)).is_ok());
    let rejected = dispatcher.try_dispatch(FakeJobQueue::delivery(third, 1));
    assert_eq!(rejected.err().map(|delivery| delivery.job_id), Some(third));

    gate.add_permits(8);
    dispatcher.close().await;
    assert_eq!(
        repository.job(second).await.map(|job| job.status),
        Some(OutpaintingJobStatus::Succeed)
    );
}

#[tokio::test]
async fn submitted_job_flows_through_the_running_worker() {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let service = OutpaintingService::new(repository.clone(), queue.clone());
    let worker = worker_with(repository.clone(), queue.clone(), ScriptedInference::answering(vec![]));
    let (shutdown, shutdown_receiver) = watch::channel(false);
    let running = tokio::spawn(async move { worker.run(shutdown_receiver).await });

    let submitted = service
        .submit(
            &identity(7),
            SubmitOutpaintingJob {
                name: None,
                prompt: "expand sky".to_owned(),
                image_url: "https://x/y.png".to_owned(),
                picture_id: None,
            },
        )
        .await;
    let Ok(job_id) = submitted else {
        panic!("submission should succeed");
    };

    let mut status = None;
    for _ in 0..400 {
        status = repository.job(job_id).await.map(|job| job.status);
        if status == Some(OutpaintingJobStatus::Succeed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let _ = shutdown.send(true);
    assert!(running.await.is_ok());
    assert_eq!(status, Some(OutpaintingJobStatus::Succeed));
}
