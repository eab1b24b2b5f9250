use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::QueueDelivery;

use super::OutpaintingWorker;

/// Fixed set of job slots fed through a bounded backlog.
///
/// At most `concurrency` jobs run at once and at most `backlog` accepted
/// deliveries wait for a slot. Submissions beyond that are handed back.
pub(super) struct JobDispatcher {
    sender: mpsc::Sender<QueueDelivery>,
    slots: Vec<JoinHandle<()>>,
}

impl JobDispatcher {
    pub(super) fn start(worker: OutpaintingWorker, concurrency: usize, backlog: usize) -> Self {
        let (sender, receiver) = mpsc::channel(backlog.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let slots = (0..concurrency.max(1))
            .map(|slot| {
                let worker = worker.clone();
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(delivery) = next else {
                            break;
                        };
                        worker.process(&delivery).await;
                    }
                    debug!(slot, "outpainting job slot stopped");
                })
            })
            .collect();

        Self { sender, slots }
    }

    /// Hands a delivery to the pool without waiting. A saturated pool
    /// returns the delivery to the caller.
    pub(super) fn try_dispatch(&self, delivery: QueueDelivery) -> Result<(), QueueDelivery> {
        match self.sender.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(delivery) | TrySendError::Closed(delivery)) => Err(delivery),
        }
    }

    pub(super) fn has_capacity(&self) -> bool {
        self.sender.capacity() > 0
    }

    /// Closes the backlog and waits for accepted deliveries to finish.
    pub(super) async fn close(self) {
        drop(self.sender);
        for slot in self.slots {
            let _ = slot.await;
        }
    }
}
