use std::time::Duration;

/// Expiry and redelivery limits shared by the job queue adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobQueuePolicy {
    /// Age, counted from the first enqueue, after which a message is dead-lettered.
    pub message_ttl: Duration,
    /// Deliveries after which a requeue dead-letters the message instead.
    pub max_deliveries: u32,
}

impl Default for JobQueuePolicy {
    fn default() -> Self {
        Self {
            message_ttl: Duration::from_secs(600),
            max_deliveries: 10,
        }
    }
}

impl JobQueuePolicy {
    pub(crate) fn ttl_millis(&self) -> i64 {
        i64::try_from(self.message_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}
