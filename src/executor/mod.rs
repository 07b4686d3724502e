//! Deletion executors and the consumer loop that drives them.
//!
//! An executor performs the backend delete for one identifier. The
//! [`run_worker`] loop pulls identifiers from a [`DeletionQueue`], hands
//! them to the executor and reports exactly one outcome per identifier.

mod command;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use command::CommandExecutor;

use crate::asset::AssetId;
use crate::queue::{DeletionQueue, Outcome};
use crate::store::{IdentifierStore, StoreError};

/// Why a single delete attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("delete command exited with {}", describe_exit(.0))]
    Exit(Option<i32>),
    #[error("delete timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Performs the backend delete for one asset.
///
/// Implementations own their transport and timeout. Returning `Err` marks
/// the identifier failed; it is not retried.
pub trait DeletionExecutor: Send + Sync + 'static {
    fn delete(&self, asset: &AssetId) -> impl Future<Output = Result<(), ExecutorError>> + Send;
}

/// Pull from `queue` and delete until `shutdown` is cancelled.
///
/// The wake notification is armed before every drain, so an enqueue that
/// lands while the worker is busy is never missed. An in-progress delete
/// is allowed to finish on shutdown. A store error ends the worker.
/// Queue calls run on the blocking pool since a durable store syncs to
/// disk under the queue lock.
pub async fn run_worker<S, E>(
    queue: DeletionQueue<S>,
    executor: Arc<E>,
    shutdown: CancellationToken,
) -> Result<(), StoreError>
where
    S: IdentifierStore + 'static,
    E: DeletionExecutor,
{
    let wake = queue.wake().clone();
    loop {
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        while !shutdown.is_cancelled() {
            let Some(asset) = off_runtime(&queue, |q| q.request_next()).await? else {
                break;
            };
            let outcome = match executor.delete(&asset).await {
                Ok(()) => Outcome::Deleted,
                Err(e) => {
                    tracing::warn!(asset = %asset, error = %e, "delete attempt failed");
                    Outcome::Failed
                }
            };
            off_runtime(&queue, move |q| q.resolve(&asset, outcome)).await?;
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = shutdown.cancelled() => {
                tracing::debug!("deletion worker stopped");
                return Ok(());
            }
        }
    }
}

/// Run a queue operation on the blocking pool.
async fn off_runtime<S, T, F>(queue: &DeletionQueue<S>, op: F) -> Result<T, StoreError>
where
    S: IdentifierStore + 'static,
    T: Send + 'static,
    F: FnOnce(&DeletionQueue<S>) -> Result<T, StoreError> + Send + 'static,
{
    let queue = queue.clone();
    tokio::task::spawn_blocking(move || op(&queue))
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::store::MemoryStore;

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    /// Records calls; fails for identifiers in `reject`.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<AssetId>>,
        reject: HashSet<String>,
    }

    impl DeletionExecutor for RecordingExecutor {
        async fn delete(&self, asset: &AssetId) -> Result<(), ExecutorError> {
            self.calls.lock().unwrap().push(asset.clone());
            tokio::task::yield_now().await;
            if self.reject.contains(asset.as_str()) {
                Err(ExecutorError::Rejected("backend said no".into()))
            } else {
                Ok(())
            }
        }
    }

    async fn wait_until_drained(queue: &DeletionQueue<MemoryStore>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !queue.snapshot().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue should drain");
    }

    #[tokio::test]
    async fn drains_existing_work_and_reports_outcomes() {
        let queue = DeletionQueue::new(MemoryStore::new());
        for raw in ["a1", "a2", "a3"] {
            queue.enqueue(id(raw)).unwrap();
        }
        let executor = Arc::new(RecordingExecutor {
            reject: HashSet::from(["a2".to_string()]),
            ..Default::default()
        });
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            queue.clone(),
            Arc::clone(&executor),
            shutdown.clone(),
        ));

        wait_until_drained(&queue).await;
        shutdown.cancel();
        worker.await.unwrap().unwrap();

        let calls = executor.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![id("a1"), id("a2"), id("a3")]);
        // Failed identifiers are dropped, not retried.
        assert_eq!(queue.request_next().unwrap(), None);
    }

    #[tokio::test]
    async fn wakes_on_enqueue() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::default());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            queue.clone(),
            Arc::clone(&executor),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(id("late")).unwrap();
        wait_until_drained(&queue).await;

        shutdown.cancel();
        worker.await.unwrap().unwrap();
        assert_eq!(*executor.calls.lock().unwrap(), vec![id("late")]);
    }

    #[tokio::test]
    async fn parallel_workers_delete_each_asset_once() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::default());
        let shutdown = CancellationToken::new();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                tokio::spawn(run_worker(
                    queue.clone(),
                    Arc::clone(&executor),
                    shutdown.clone(),
                ))
            })
            .collect();

        for n in 0..40 {
            queue.enqueue(id(&format!("asset-{n}"))).unwrap();
        }
        wait_until_drained(&queue).await;
        shutdown.cancel();
        for w in workers {
            w.await.unwrap().unwrap();
        }

        let calls = executor.calls.lock().unwrap().clone();
        let distinct: HashSet<_> = calls.iter().collect();
        assert_eq!(calls.len(), 40);
        assert_eq!(distinct.len(), 40);
    }

    #[tokio::test]
    async fn stops_promptly_when_idle() {
        let queue = DeletionQueue::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            queue,
            Arc::new(RecordingExecutor::default()),
            shutdown.clone(),
        ));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    /// In-memory store whose removals block the calling thread.
    struct SlowRemoveStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl IdentifierStore for SlowRemoveStore {
        fn read(&self) -> Result<Vec<AssetId>, StoreError> {
            self.inner.read()
        }

        fn insert(&mut self, id: &AssetId) -> Result<(), StoreError> {
            self.inner.insert(id)
        }

        fn remove(&mut self, id: &AssetId) -> Result<(), StoreError> {
            std::thread::sleep(self.delay);
            self.inner.remove(id)
        }
    }

    #[tokio::test]
    async fn slow_store_does_not_stall_the_runtime() {
        let queue = DeletionQueue::new(SlowRemoveStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(400),
        });
        queue.enqueue(id("a1")).unwrap();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            queue.clone(),
            Arc::new(RecordingExecutor::default()),
            shutdown.clone(),
        ));

        // Single-threaded runtime: a timer only fires on time if the
        // worker is not blocking this thread inside the store.
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_millis(300));

        tokio::time::timeout(Duration::from_secs(2), async {
            while !queue.snapshot().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue should drain");
        shutdown.cancel();
        worker.await.unwrap().unwrap();
    }

    #[test]
    fn exit_error_message() {
        assert_eq!(
            ExecutorError::Exit(Some(3)).to_string(),
            "delete command exited with status 3"
        );
        assert_eq!(
            ExecutorError::Exit(None).to_string(),
            "delete command exited with a signal"
        );
    }
}
