use std::sync::Arc;
use std::sync::atomic::Ordering;

use lumora_core::AppError;
use lumora_domain::OutpaintingJobStatus;

use super::{ENQUEUE_FAILED_MESSAGE, OutpaintingService, SubmitOutpaintingJob};
use crate::test_support::{FakeJobQueue, FakeJobRepository, identity};

fn submission(prompt: &str, image_url: &str) -> SubmitOutpaintingJob {
    SubmitOutpaintingJob {
        name: None,
        prompt: prompt.to_owned(),
        image_url: image_url.to_owned(),
        picture_id: None,
    }
}

fn fixture() -> (OutpaintingService, Arc<FakeJobRepository>, Arc<FakeJobQueue>) {
    let repository = Arc::new(FakeJobRepository::default());
    let queue = Arc::new(FakeJobQueue::default());
    let service = OutpaintingService::new(repository.clone(), queue.clone());
    (service, repository, queue)
}

#[tokio::test]
async fn submit_creates_waiting_job_and_enqueues_it() {
    let (service, repository, queue) = fixture();

    let job_id = service
        .submit(&identity(7), submission("expand sky", "https://x/y.png"))
        .await;

    let Ok(job_id) = job_id else {
        panic!("submission should succeed");
    };
    let job = repository.job(job_id).await;
    assert_eq!(job.as_ref().map(|job| job.status), Some(OutpaintingJobStatus::Wait));
    assert_eq!(job.map(|job| job.name), Some("outpaint y.png".to_owned()));
    assert_eq!(*queue.enqueued.lock().await, vec![job_id]);
}

#[tokio::test]
async fn failed_publish_keeps_job_waiting_with_diagnostic() {
    let (service, repository, queue) = fixture();
    queue.fail_enqueue.store(true, Ordering::SeqCst);

    let result = service
        .submit(&identity(7), submission("expand sky", "https://x/y.png"))
        .await;

    let Ok(job_id) = result else {
        panic!("publish failures are not surfaced to the caller");
    };
    let job = repository.job(job_id).await;
    assert_eq!(job.as_ref().map(|job| job.status), Some(OutpaintingJobStatus::Wait));
    assert_eq!(
        job.and_then(|job| job.exec_message),
        Some(ENQUEUE_FAILED_MESSAGE.to_owned())
    );
}

#[tokio::test]
async fn submit_rejects_invalid_input_before_persisting() {
    let (service, repository, _) = fixture();

    let blank_prompt = service
        .submit(&identity(1), submission("   ", "https://x/y.png"))
        .await;
    let bad_scheme = service
        .submit(&identity(1), submission("wider", "ftp://x/y.png"))
        .await;
    let not_a_url = service
        .submit(&identity(1), submission("wider", "y.png"))
        .await;

    assert!(matches!(blank_prompt, Err(AppError::Validation(_))));
    assert!(matches!(bad_scheme, Err(AppError::Validation(_))));
    assert!(matches!(not_a_url, Err(AppError::Validation(_))));
    assert!(repository.jobs.lock().await.is_empty());
}

#[tokio::test]
async fn list_returns_only_the_callers_jobs() {
    let (service, _, _) = fixture();
    let _ = service
        .submit(&identity(1), submission("first", "https://x/a.png"))
        .await;
    let _ = service
        .submit(&identity(2), submission("other", "https://x/b.png"))
        .await;
    let _ = service
        .submit(&identity(1), submission("second", "https://x/c.png"))
        .await;

    let jobs = service.list(&identity(1)).await.unwrap_or_default();

    let names: Vec<String> = jobs.into_iter().map(|job| job.name).collect();
    assert_eq!(names, vec!["outpaint c.png", "outpaint a.png"]);
}

#[tokio::test]
async fn delete_is_limited_to_the_owner() {
    let (service, repository, _) = fixture();
    let Ok(job_id) = service
        .submit(&identity(1), submission("expand", "https://x/a.png"))
        .await
    else {
        panic!("submission should succeed");
    };

    let by_other = service.delete(&identity(2), job_id).await;
    let by_owner = service.delete(&identity(1), job_id).await;
    let again = service.delete(&identity(1), job_id).await;

    assert!(matches!(by_other, Err(AppError::Forbidden(_))));
    assert!(by_owner.is_ok());
    assert!(matches!(again, Err(AppError::NotFound(_))));
    assert!(repository.job(job_id).await.is_none());
}

#[tokio::test]
async fn get_hides_jobs_of_other_users() {
    let (service, _, _) = fixture();
    let Ok(job_id) = service
        .submit(&identity(1), submission("expand", "https://x/a.png"))
        .await
    else {
        panic!("submission should succeed");
    };

    assert!(service.get(&identity(1), job_id).await.is_ok());
    assert!(matches!(
        service.get(&identity(3), job_id).await,
        Err(AppError::NotFound(_))
    ));
}
