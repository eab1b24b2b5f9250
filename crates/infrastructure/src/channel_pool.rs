//! Fixed-size pool of broker channels.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use lumora_core::{AppError, AppResult};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Hands out exclusive use of one of a fixed set of channels.
///
/// `acquire` waits while every channel is checked out. A channel goes back to
/// the pool when its guard is dropped.
pub struct ChannelPool<C> {
    idle: Mutex<Vec<C>>,
    permits: Semaphore,
}

impl<C> ChannelPool<C> {
    /// Creates a pool owning the given channels.
    #[must_use]
    pub fn new(channels: Vec<C>) -> Self {
        Self {
            permits: Semaphore::new(channels.len()),
            idle: Mutex::new(channels),
        }
    }

    /// Waits for a free channel.
    pub async fn acquire(&self) -> AppResult<PooledChannel<'_, C>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|error| AppError::Internal(format!("channel pool is closed: {error}")))?;

        let channel = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| AppError::Internal("channel pool has no idle channel".to_owned()))?;

        Ok(PooledChannel {
            pool: self,
            channel: Some(channel),
            _permit: permit,
        })
    }

    /// Returns how many channels are not checked out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Exclusive handle on one pooled channel.
pub struct PooledChannel<'a, C> {
    pool: &'a ChannelPool<C>,
    channel: Option<C>,
    _permit: SemaphorePermit<'a>,
}

impl<C> Deref for PooledChannel<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        match self.channel.as_ref() {
            Some(channel) => channel,
            None => unreachable!("pooled channel is only taken on drop"),
        }
    }
}

impl<C> DerefMut for PooledChannel<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        match self.channel.as_mut() {
            Some(channel) => channel,
            None => unreachable!("pooled channel is only taken on drop"),
        }
    }
}

impl<C> Drop for PooledChannel<'_, C> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::ChannelPool;

    #[tokio::test]
    async fn channels_are_returned_when_guards_drop() {
        let pool = ChannelPool::new(vec![1_u8, 2]);

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);
        let again = pool.acquire().await.map(|channel| *channel);
        assert!(matches!(again, Ok(1 | 2)));
    }

    #[tokio::test]
    async fn acquire_waits_while_the_pool_is_exhausted() {
        let pool = Arc::new(ChannelPool::new(vec![String::from("only")]));
        let Ok(held) = pool.acquire().await else {
            panic!("first acquire should succeed");
        };

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.acquire()
                    .await
                    .map(|channel| channel.clone())
                    .unwrap_or_default()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.ok(), Some("only".to_owned()));
    }
}
