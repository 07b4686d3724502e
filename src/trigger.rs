//! Enqueue trigger and wake signal.
//!
//! Producers hold an [`EnqueueTrigger`] and send typed delete requests
//! over a channel; [`forward_requests`] applies them to the queue.
//! Consumers wait on the queue's [`WakeSignal`] and always re-read the
//! queue after waking, so coalesced signals are harmless.

use std::sync::Arc;

use tokio::sync::futures::Notified;
use tokio::sync::{Notify, mpsc};

use crate::asset::AssetId;
use crate::queue::DeletionQueue;
use crate::store::{IdentifierStore, StoreError};

/// Coalescing "work available" notification.
///
/// A signal wakes every consumer currently waiting. A consumer that is not
/// waiting misses it, which is why consumers arm [`WakeSignal::notified`]
/// before draining the queue.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget wake-up for all waiting consumers.
    pub fn signal_work_available(&self) {
        self.notify.notify_waiters();
    }

    /// Future that completes on the next signal.
    ///
    /// Pin it and call `enable()` to register interest before checking
    /// the queue; a signal sent between the check and the `await` is then
    /// still observed.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

/// A "delete requested" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequested {
    /// Raw identifier as received. Empty tokens are dropped on arrival.
    pub asset: String,
}

/// Returned when the receiving side of the trigger channel is gone.
#[derive(Debug, thiserror::Error)]
#[error("enqueue listener closed")]
pub struct TriggerClosed;

/// Producer handle for delete requests.
#[derive(Debug, Clone)]
pub struct EnqueueTrigger {
    tx: mpsc::UnboundedSender<DeleteRequested>,
}

impl EnqueueTrigger {
    pub fn request_delete(&self, asset: impl Into<String>) -> Result<(), TriggerClosed> {
        self.tx
            .send(DeleteRequested {
                asset: asset.into(),
            })
            .map_err(|_| TriggerClosed)
    }
}

/// Receiving side of the trigger channel.
#[derive(Debug)]
pub struct EnqueueEvents {
    rx: mpsc::UnboundedReceiver<DeleteRequested>,
}

/// Create a connected trigger/events pair.
pub fn channel() -> (EnqueueTrigger, EnqueueEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EnqueueTrigger { tx }, EnqueueEvents { rx })
}

/// Apply delete requests to the queue until every trigger is dropped.
///
/// Returns the number of identifiers enqueued. A store error stops the
/// loop and is returned to the caller; remaining events stay unread.
pub async fn forward_requests<S>(
    mut events: EnqueueEvents,
    queue: DeletionQueue<S>,
) -> Result<usize, StoreError>
where
    S: IdentifierStore,
{
    let mut enqueued = 0;
    while let Some(event) = events.rx.recv().await {
        let Some(asset) = AssetId::parse(event.asset) else {
            tracing::warn!("ignoring delete request without an asset identifier");
            continue;
        };
        queue.enqueue(asset)?;
        enqueued += 1;
    }
    tracing::debug!(enqueued, "enqueue trigger closed");
    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn armed_waiter_sees_signal() {
        let wake = WakeSignal::new();
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        wake.signal_work_available();
        tokio::time::timeout(Duration::from_secs(1), notified)
            .await
            .expect("armed waiter must observe the signal");
    }

    #[tokio::test]
    async fn signals_coalesce_into_one_wakeup() {
        let wake = WakeSignal::new();
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        for _ in 0..5 {
            wake.signal_work_available();
        }
        notified.await;

        // Nothing is stored for a waiter that arms afterwards.
        let late = tokio::time::timeout(Duration::from_millis(50), wake.notified()).await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn every_waiter_is_woken() {
        let wake = WakeSignal::new();
        let mut handles = Vec::new();
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        for _ in 0..3 {
            let wake = wake.clone();
            let ready_tx = ready_tx.clone();
            handles.push(tokio::spawn(async move {
                let notified = wake.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                ready_tx.send(()).unwrap();
                notified.await;
            }));
        }
        for _ in 0..3 {
            ready_rx.recv().await.unwrap();
        }

        wake.signal_work_available();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn forwards_requests_into_queue() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let (trigger, events) = channel();

        trigger.request_delete("a1").unwrap();
        trigger.request_delete("a1").unwrap();
        trigger.request_delete("a2").unwrap();
        drop(trigger);

        let enqueued = forward_requests(events, queue.clone()).await.unwrap();
        assert_eq!(enqueued, 3);
        let pending: Vec<AssetId> = queue
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|e| e.asset)
            .collect();
        assert_eq!(pending, vec![id("a1"), id("a2")]);
    }

    #[tokio::test]
    async fn empty_request_is_ignored() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let (trigger, events) = channel();
        trigger.request_delete("").unwrap();
        trigger.request_delete("a1").unwrap();
        drop(trigger);

        assert_eq!(forward_requests(events, queue.clone()).await.unwrap(), 1);
        assert_eq!(queue.request_next().unwrap(), Some(id("a1")));
    }

    #[tokio::test]
    async fn forwarded_request_wakes_consumer() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let (trigger, events) = channel();
        let forwarder = tokio::spawn(forward_requests(events, queue.clone()));

        let wake = queue.wake().clone();
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        assert_eq!(queue.request_next().unwrap(), None);

        trigger.request_delete("a1").unwrap();
        tokio::time::timeout(Duration::from_secs(1), notified)
            .await
            .unwrap();
        assert_eq!(queue.request_next().unwrap(), Some(id("a1")));

        drop(trigger);
        assert_eq!(forwarder.await.unwrap().unwrap(), 1);
    }

    #[test]
    fn request_after_listener_drop_fails() {
        let (trigger, events) = channel();
        drop(events);
        assert!(trigger.request_delete("a1").is_err());
    }
}
