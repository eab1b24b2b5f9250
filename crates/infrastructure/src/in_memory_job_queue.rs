use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use lumora_application::{DeadLetter, DeadLetterReason, JobQueue, QueueDelivery};
use lumora_core::{AppResult, JobId};
use tokio::sync::Mutex;

use crate::JobQueuePolicy;

/// In-process job queue with the same delivery, expiry and dead-letter
/// rules as the Redis adapter.
pub struct InMemoryJobQueue {
    policy: JobQueuePolicy,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueueDelivery>,
    inflight: HashMap<String, QueueDelivery>,
    dead: VecDeque<DeadLetter>,
}

impl QueueState {
    fn dead_letter(&mut self, delivery: QueueDelivery, reason: DeadLetterReason) {
        self.dead.push_back(DeadLetter {
            message_id: delivery.message_id,
            job_id: delivery.job_id,
            reason,
            delivery_count: delivery.delivery_count,
            enqueued_at: delivery.enqueued_at,
            dead_lettered_at: Utc::now(),
        });
    }
}

impl InMemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(policy: JobQueuePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn is_expired(&self, delivery: &QueueDelivery) -> bool {
        (Utc::now() - delivery.enqueued_at).num_milliseconds() > self.policy.ttl_millis()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
        self.state.lock().await.ready.push_back(QueueDelivery {
            message_id: uuid::Uuid::new_v4().to_string(),
            job_id,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    async fn receive(&self) -> AppResult<Option<QueueDelivery>> {
        let mut state = self.state.lock().await;
        while let Some(mut delivery) = state.ready.pop_front() {
            if self.is_expired(&delivery) {
                state.dead_letter(delivery, DeadLetterReason::Expired);
                continue;
            }

            delivery.delivery_count += 1;
            state
                .inflight
                .insert(delivery.message_id.clone(), delivery.clone());
            return Ok(Some(delivery));
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &QueueDelivery) -> AppResult<()> {
        self.state.lock().await.inflight.remove(&delivery.message_id);
        Ok(())
    }

    async fn nack(&self, delivery: &QueueDelivery, requeue: bool) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(inflight) = state.inflight.remove(&delivery.message_id) else {
            return Ok(());
        };

        if !requeue {
            state.dead_letter(inflight, DeadLetterReason::Rejected);
        } else if inflight.delivery_count >= self.policy.max_deliveries {
            state.dead_letter(inflight, DeadLetterReason::DeliveryLimit);
        } else {
            state.ready.push_back(inflight);
        }
        Ok(())
    }

    async fn receive_dead_letter(&self) -> AppResult<Option<DeadLetter>> {
        Ok(self.state.lock().await.dead.pop_front())
    }

    async fn expire_abandoned(&self) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .inflight
            .values()
            .filter(|delivery| self.is_expired(delivery))
            .map(|delivery| delivery.message_id.clone())
            .collect();

        for message_id in &expired {
            if let Some(delivery) = state.inflight.remove(message_id) {
                state.dead_letter(delivery, DeadLetterReason::Expired);
            }
        }
        Ok(expired.len())
    }
}
