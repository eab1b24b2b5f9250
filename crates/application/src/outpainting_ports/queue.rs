use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumora_core::{AppResult, JobId};
use serde::{Deserialize, Serialize};

/// One delivery of a queued job message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDelivery {
    /// Broker-side message identity, stable across redeliveries.
    pub message_id: String,
    /// Job the message refers to.
    pub job_id: JobId,
    /// Number of times the message has been handed to a consumer, this one included.
    pub delivery_count: u32,
    /// First enqueue time; the time-to-live counts from here.
    pub enqueued_at: DateTime<Utc>,
}

impl QueueDelivery {
    /// Returns whether an earlier delivery of this message was negatively acknowledged.
    #[must_use]
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Why a message left the main queue without being acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Negatively acknowledged without requeue.
    Rejected,
    /// Outlived the queue time-to-live.
    Expired,
    /// Requeued more often than the delivery limit allows.
    DeliveryLimit,
}

impl DeadLetterReason {
    /// Returns a stable storage value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::DeliveryLimit => "delivery_limit",
        }
    }
}

/// Message routed to the dead-letter destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Broker-side message identity.
    pub message_id: String,
    /// Job the message referred to.
    pub job_id: JobId,
    /// Dead-letter cause.
    pub reason: DeadLetterReason,
    /// Deliveries made before dead-lettering.
    pub delivery_count: u32,
    /// First enqueue time.
    pub enqueued_at: DateTime<Utc>,
    /// Time the message was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}

/// Durable at-least-once queue of outpainting job ids.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publishes a job id.
    async fn enqueue(&self, job_id: JobId) -> AppResult<()>;

    /// Takes the next ready message, if any, and marks it in flight.
    ///
    /// Messages older than the time-to-live are dead-lettered instead of
    /// being returned.
    async fn receive(&self) -> AppResult<Option<QueueDelivery>>;

    /// Permanently removes an in-flight message.
    async fn ack(&self, delivery: &QueueDelivery) -> AppResult<()>;

    /// Returns an in-flight message to the queue, or dead-letters it when
    /// `requeue` is false or the delivery limit is reached.
    async fn nack(&self, delivery: &QueueDelivery, requeue: bool) -> AppResult<()>;

    /// Takes the next dead-lettered message, if any.
    async fn receive_dead_letter(&self) -> AppResult<Option<DeadLetter>>;

    /// Dead-letters in-flight messages that outlived the time-to-live and
    /// returns how many were moved.
    async fn expire_abandoned(&self) -> AppResult<usize>;
}
