use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lumora_core::UserId;
use lumora_domain::{RoleAssignment, RoleChange, RoleDomain, SpaceRole};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::AuthorizationService;
use crate::authorization_service::StampedChange;

/// Tuning for the batched role writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleWriterConfig {
    /// Pending changes that trigger an immediate flush.
    pub batch_size: usize,
    /// Maximum time a change waits in the batch buffer.
    pub flush_interval: Duration,
    /// Capacity of the intake channel.
    pub queue_capacity: usize,
    /// Concurrent overflow applies allowed when the intake is full.
    pub pool_size: usize,
}

impl Default for RoleWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_millis(100),
            queue_capacity: 1000,
            pool_size: 100,
        }
    }
}

/// Asynchronous batched writer for role graph mutations.
///
/// Submissions are fire-and-forget. Failed batches are logged and never
/// reported back to the submitter.
#[derive(Clone)]
pub struct RoleAssignmentWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    authorization_service: AuthorizationService,
    intake: mpsc::Sender<StampedChange>,
    stop: watch::Sender<bool>,
    accepting: AtomicBool,
    pool: Arc<Semaphore>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoleAssignmentWriter {
    /// Starts the flush loop on the current runtime.
    #[must_use]
    pub fn start(authorization_service: AuthorizationService, config: RoleWriterConfig) -> Self {
        let batch_size = config.batch_size.max(1);
        let (intake, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (stop, stop_receiver) = watch::channel(false);

        let flush_task = tokio::spawn(run_flush_loop(
            authorization_service.clone(),
            receiver,
            stop_receiver,
            batch_size,
            config.flush_interval,
        ));

        Self {
            inner: Arc::new(WriterInner {
                authorization_service,
                intake,
                stop,
                accepting: AtomicBool::new(true),
                pool: Arc::new(Semaphore::new(config.pool_size.max(1))),
                flush_task: Mutex::new(Some(flush_task)),
            }),
        }
    }

    /// Queues a role change without waiting for it to be applied.
    ///
    /// When the intake is full the change is applied on the bounded overflow
    /// pool instead of being dropped. Every change is stamped on submission,
    /// so an older change still buffered never overrides a newer one for the
    /// same pair. After shutdown begins changes are dropped.
    pub fn submit(&self, change: RoleChange) {
        if !self.inner.accepting.load(Ordering::Acquire) {
            warn!(?change, "role writer is shut down; dropping role change");
            return;
        }

        let stamped = self.inner.authorization_service.stamp(change);
        match self.inner.intake.try_send(stamped) {
            Ok(()) => {}
            Err(TrySendError::Full(stamped)) => self.apply_on_pool(stamped),
            Err(TrySendError::Closed(stamped)) => {
                warn!(
                    change = ?stamped.change,
                    "role writer intake is closed; dropping role change"
                );
            }
        }
    }

    /// Queues an assignment that replaces the user's role in the domain.
    pub fn assign(&self, user_id: UserId, role: SpaceRole, domain: RoleDomain) {
        self.submit(RoleChange::Assign(RoleAssignment::new(user_id, role, domain)));
    }

    /// Queues removal of the user's role in the domain.
    pub fn revoke(&self, user_id: UserId, domain: RoleDomain) {
        self.submit(RoleChange::Revoke { user_id, domain });
    }

    /// Stops accepting changes, flushes the batch buffer once and releases
    /// the overflow pool. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.inner.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        let _ = self.inner.stop.send(true);
        let flush_task = self.inner.flush_task.lock().await.take();
        if let Some(flush_task) = flush_task {
            if let Err(error) = flush_task.await {
                error!(error = %error, "role writer flush loop terminated abnormally");
            }
        }

        self.inner.pool.close();
        debug!("role writer stopped");
    }

    fn apply_on_pool(&self, stamped: StampedChange) {
        let pool = Arc::clone(&self.inner.pool);
        let authorization_service = self.inner.authorization_service.clone();

        tokio::spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                warn!(change = ?stamped.change, "role writer pool released; dropping role change");
                return;
            };

            if let Err(error) = authorization_service.apply_stamped(&[stamped]).await {
                error!(
                    change = ?stamped.change,
                    error = %error,
                    "failed to apply overflow role change"
                );
            }
        });
    }
}

async fn run_flush_loop(
    authorization_service: AuthorizationService,
    mut intake: mpsc::Receiver<StampedChange>,
    mut stop: watch::Receiver<bool>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut pending: Vec<StampedChange> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            received = intake.recv() => {
                let Some(change) = received else {
                    break;
                };
                pending.push(change);
                if pending.len() >= batch_size {
                    flush(&authorization_service, &mut pending).await;
                }
            }
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush(&authorization_service, &mut pending).await;
                }
            }
        }
    }

    flush(&authorization_service, &mut pending).await;

    intake.close();
    let mut dropped = 0_usize;
    while intake.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "role changes still queued at shutdown were dropped");
    }
}

async fn flush(authorization_service: &AuthorizationService, pending: &mut Vec<StampedChange>) {
    if pending.is_empty() {
        return;
    }

    let batch = std::mem::take(pending);
    match authorization_service.apply_stamped(&batch).await {
        Ok(()) => debug!(batch_size = batch.len(), "role change batch applied"),
        Err(error) => error!(
            batch_size = batch.len(),
            error = %error,
            "failed to apply role change batch"
        ),
    }
}
