//! Redis-backed durable queue for outpainting jobs.
//!
//! Layout under the key prefix:
//! - `<prefix>:ready` list of message envelopes, consumed FIFO
//! - `<prefix>:inflight` hash of message id to envelope for unacknowledged deliveries
//! - `<prefix>:dead` list of dead-lettered envelopes
//!
//! Every state change runs as one Lua script so a message is never in two
//! places at once.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lumora_application::{DeadLetter, DeadLetterReason, JobQueue, QueueDelivery};
use lumora_core::{AppError, AppResult, JobId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ChannelPool, JobQueuePolicy};

const RECEIVE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
while true do
  local raw = redis.call('RPOP', KEYS[1])
  if not raw then
    return false
  end
  local message = cjson.decode(raw)
  if now - message.enqueued_at_ms > ttl then
    message.reason = 'expired'
    message.dead_lettered_at_ms = now
    redis.call('LPUSH', KEYS[3], cjson.encode(message))
  else
    message.delivery_count = message.delivery_count + 1
    local encoded = cjson.encode(message)
    redis.call('HSET', KEYS[2], message.message_id, encoded)
    return encoded
  end
end
"#;

const NACK_SCRIPT: &str = r#"
local raw = redis.call('HGET', KEYS[2], ARGV[1])
if not raw then
  return 0
end
redis.call('HDEL', KEYS[2], ARGV[1])
local message = cjson.decode(raw)
if ARGV[2] == '1' and message.delivery_count < tonumber(ARGV[3]) then
  redis.call('LPUSH', KEYS[1], raw)
  return 1
end
if ARGV[2] == '1' then
  message.reason = 'delivery_limit'
else
  message.reason = 'rejected'
end
message.dead_lettered_at_ms = tonumber(ARGV[4])
redis.call('LPUSH', KEYS[3], cjson.encode(message))
return 2
"#;

const EXPIRE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
local entries = redis.call('HGETALL', KEYS[1])
local expired = 0
for index = 1, #entries, 2 do
  local message = cjson.decode(entries[index + 1])
  if now - message.enqueued_at_ms > ttl then
    redis.call('HDEL', KEYS[1], entries[index])
    message.reason = 'expired'
    message.dead_lettered_at_ms = now
    redis.call('LPUSH', KEYS[2], cjson.encode(message))
    expired = expired + 1
  end
end
return expired
"#;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    message_id: String,
    job_id: i64,
    delivery_count: u32,
    enqueued_at_ms: i64,
}

#[derive(Debug, Deserialize)]
struct DeadEnvelope {
    message_id: String,
    job_id: i64,
    delivery_count: u32,
    enqueued_at_ms: i64,
    reason: String,
    dead_lettered_at_ms: i64,
}

/// Redis implementation of the job queue port.
pub struct RedisJobQueue {
    channels: ChannelPool<ConnectionManager>,
    key_prefix: String,
    policy: JobQueuePolicy,
}

impl RedisJobQueue {
    /// Opens `channel_count` connections and builds the queue on top of them.
    pub async fn connect(
        client: redis::Client,
        key_prefix: impl Into<String>,
        channel_count: usize,
        policy: JobQueuePolicy,
    ) -> AppResult<Self> {
        let mut channels = Vec::with_capacity(channel_count.max(1));
        for _ in 0..channel_count.max(1) {
            let connection = ConnectionManager::new(client.clone())
                .await
                .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;
            channels.push(connection);
        }

        let key_prefix = key_prefix.into();
        info!(
            key_prefix = %key_prefix,
            channels = channels.len(),
            "redis job queue connected"
        );

        Ok(Self {
            channels: ChannelPool::new(channels),
            key_prefix,
            policy,
        })
    }

    fn key_for(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.key_prefix)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
        let envelope = Envelope {
            message_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.as_i64(),
            delivery_count: 0,
            enqueued_at_ms: Utc::now().timestamp_millis(),
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|error| AppError::Internal(format!("failed to encode job message: {error}")))?;

        let mut channel = self.channels.acquire().await?;
        channel
            .lpush::<_, _, ()>(self.key_for("ready"), payload)
            .await
            .map_err(|error| AppError::Internal(format!("failed to publish job message: {error}")))
    }

    async fn receive(&self) -> AppResult<Option<QueueDelivery>> {
        let mut channel = self.channels.acquire().await?;
        let raw: Option<String> = Script::new(RECEIVE_SCRIPT)
            .key(self.key_for("ready"))
            .key(self.key_for("inflight"))
            .key(self.key_for("dead"))
            .arg(Utc::now().timestamp_millis())
            .arg(self.policy.ttl_millis())
            .invoke_async(&mut *channel)
            .await
            .map_err(|error| AppError::Internal(format!("failed to receive job message: {error}")))?;

        raw.map(|raw| decode_delivery(&raw)).transpose()
    }

    async fn ack(&self, delivery: &QueueDelivery) -> AppResult<()> {
        let mut channel = self.channels.acquire().await?;
        channel
            .hdel::<_, _, ()>(self.key_for("inflight"), delivery.message_id.as_str())
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acknowledge job message: {error}"))
            })
    }

    async fn nack(&self, delivery: &QueueDelivery, requeue: bool) -> AppResult<()> {
        let mut channel = self.channels.acquire().await?;
        Script::new(NACK_SCRIPT)
            .key(self.key_for("ready"))
            .key(self.key_for("inflight"))
            .key(self.key_for("dead"))
            .arg(delivery.message_id.as_str())
            .arg(if requeue { "1" } else { "0" })
            .arg(self.policy.max_deliveries)
            .arg(Utc::now().timestamp_millis())
            .invoke_async::<i32>(&mut *channel)
            .await
            .map_err(|error| AppError::Internal(format!("failed to reject job message: {error}")))?;
        Ok(())
    }

    async fn receive_dead_letter(&self) -> AppResult<Option<DeadLetter>> {
        let mut channel = self.channels.acquire().await?;
        let raw: Option<String> = channel
            .rpop(self.key_for("dead"), None)
            .await
            .map_err(|error| AppError::Internal(format!("failed to read dead letter: {error}")))?;

        raw.map(|raw| decode_dead_letter(&raw)).transpose()
    }

    async fn expire_abandoned(&self) -> AppResult<usize> {
        let mut channel = self.channels.acquire().await?;
        let expired: i64 = Script::new(EXPIRE_SCRIPT)
            .key(self.key_for("inflight"))
            .key(self.key_for("dead"))
            .arg(Utc::now().timestamp_millis())
            .arg(self.policy.ttl_millis())
            .invoke_async(&mut *channel)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to expire in-flight job messages: {error}"))
            })?;

        Ok(usize::try_from(expired).unwrap_or_default())
    }
}

fn decode_delivery(raw: &str) -> AppResult<QueueDelivery> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|error| AppError::Internal(format!("failed to decode job message: {error}")))?;

    Ok(QueueDelivery {
        message_id: envelope.message_id,
        job_id: JobId::new(envelope.job_id)?,
        delivery_count: envelope.delivery_count,
        enqueued_at: timestamp(envelope.enqueued_at_ms)?,
    })
}

fn decode_dead_letter(raw: &str) -> AppResult<DeadLetter> {
    let envelope: DeadEnvelope = serde_json::from_str(raw)
        .map_err(|error| AppError::Internal(format!("failed to decode dead letter: {error}")))?;
    let reason = match envelope.reason.as_str() {
        "rejected" => DeadLetterReason::Rejected,
        "expired" => DeadLetterReason::Expired,
        "delivery_limit" => DeadLetterReason::DeliveryLimit,
        other => {
            return Err(AppError::Internal(format!(
                "unknown dead letter reason '{other}'"
            )));
        }
    };

    Ok(DeadLetter {
        message_id: envelope.message_id,
        job_id: JobId::new(envelope.job_id)?,
        reason,
        delivery_count: envelope.delivery_count,
        enqueued_at: timestamp(envelope.enqueued_at_ms)?,
        dead_lettered_at: timestamp(envelope.dead_lettered_at_ms)?,
    })
}

fn timestamp(millis: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppError::Internal(format!("invalid queue timestamp {millis}")))
}
