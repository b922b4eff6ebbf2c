//! Asynchronous, batched soft deletion.
//!
//! Producers push one [`PendingDeletion`] per short code onto a bounded
//! channel and wait when it is full. A single worker task drains the
//! channel into an accumulator and hands the accumulated batch to a
//! [`DeletionSink`] on every interval tick. A failed batch is logged and
//! dropped; there is no retry and the producer is never told.

use async_trait::async_trait;
use shortlink_core::{OwnerId, Result, ShortCode, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Shortest flush interval the worker accepts; shorter values are raised to it.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// A soft delete waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    pub short_url: ShortCode,
    pub owner_id: OwnerId,
}

/// Applies a batch of deletions atomically.
#[async_trait]
pub trait DeletionSink: Send + Sync + 'static {
    /// Marks every entry of `batch` deleted, all or nothing.
    async fn apply(&self, batch: &[PendingDeletion]) -> Result<()>;
}

/// Handle to the deletion worker. Cloning shares the same worker.
#[derive(Debug, Clone)]
pub struct DeletionQueue {
    sender: mpsc::Sender<PendingDeletion>,
    cancel: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DeletionQueue {
    /// Spawns the worker on the current Tokio runtime.
    ///
    /// `capacity` is raised to at least one slot and `flush_interval` to at
    /// least [`MIN_FLUSH_INTERVAL`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<S: DeletionSink>(sink: S, capacity: usize, flush_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();

        let flush_interval = if flush_interval < MIN_FLUSH_INTERVAL {
            warn!(
                requested_ms = flush_interval.as_millis() as u64,
                "flush interval below minimum, using {}ms",
                MIN_FLUSH_INTERVAL.as_millis()
            );
            MIN_FLUSH_INTERVAL
        } else {
            flush_interval
        };

        let worker = tokio::spawn(run_worker(
            sink,
            receiver,
            flush_interval,
            cancel.clone(),
        ));

        Self {
            sender,
            cancel,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Queues one deletion per code, waiting for room when the queue is full.
    ///
    /// Fails only once the worker has been shut down.
    pub async fn enqueue(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        for code in codes {
            let entry = PendingDeletion {
                short_url: code.clone(),
                owner_id: owner.clone(),
            };
            self.sender
                .send(entry)
                .await
                .map_err(|_| StorageError::Operation("deletion queue is shut down".to_string()))?;
        }
        debug!(owner = %owner, count = codes.len(), "queued deletions");
        Ok(())
    }

    /// Stops the worker after it flushes everything already queued.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        if let Err(err) = worker.await {
            warn!(error = %err, "deletion worker terminated abnormally");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_worker<S: DeletionSink>(
    sink: S,
    mut receiver: mpsc::Receiver<PendingDeletion>,
    flush_interval: Duration,
    cancel: CancellationToken,
) {
    let mut pending = Vec::new();
    let mut ticker = tokio::time::interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = flush_interval.as_millis() as u64, "deletion worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = receiver.recv() => match received {
                Some(entry) => pending.push(entry),
                // every handle dropped
                None => break,
            },
            _ = ticker.tick() => flush(&sink, &mut pending).await,
        }
    }

    receiver.close();
    while let Some(entry) = receiver.recv().await {
        pending.push(entry);
    }
    flush(&sink, &mut pending).await;

    info!("deletion worker stopped");
}

async fn flush<S: DeletionSink>(sink: &S, pending: &mut Vec<PendingDeletion>) {
    if pending.is_empty() {
        return;
    }

    let batch = std::mem::take(pending);
    match sink.apply(&batch).await {
        Ok(()) => debug!(count = batch.len(), "flushed deletions"),
        Err(err) => error!(
            error = %err,
            dropped = batch.len(),
            "failed to flush deletions, batch dropped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{Notify, Semaphore};

    const INTERVAL: Duration = Duration::from_millis(50);

    #[derive(Clone, Default)]
    struct RecordingSink {
        applied: Arc<SyncMutex<Vec<Vec<PendingDeletion>>>>,
        attempts: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn applied(&self) -> Vec<Vec<PendingDeletion>> {
            self.applied.lock().clone()
        }
    }

    #[async_trait]
    impl DeletionSink for RecordingSink {
        async fn apply(&self, batch: &[PendingDeletion]) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("sink offline".to_string()));
            }
            self.applied.lock().push(batch.to_vec());
            Ok(())
        }
    }

    /// Parks inside `apply` until released, so the worker stops draining.
    struct BlockingSink {
        entered: Arc<Notify>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl DeletionSink for BlockingSink {
        async fn apply(&self, _batch: &[PendingDeletion]) -> Result<()> {
            self.entered.notify_one();
            let _permit = self.release.acquire().await;
            Ok(())
        }
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::new_unchecked(id)
    }

    fn code(value: &str) -> ShortCode {
        ShortCode::new_unchecked(value)
    }

    #[tokio::test]
    async fn flushes_accumulated_entries_after_interval() {
        let sink = RecordingSink::default();
        let queue = DeletionQueue::spawn(sink.clone(), DEFAULT_QUEUE_CAPACITY, INTERVAL);

        queue
            .enqueue(&owner("u1"), &[code("aaa"), code("bbb")])
            .await
            .unwrap();
        assert!(sink.applied().is_empty());

        tokio::time::sleep(INTERVAL * 4).await;

        let applied = sink.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(
            applied[0],
            vec![
                PendingDeletion {
                    short_url: code("aaa"),
                    owner_id: owner("u1")
                },
                PendingDeletion {
                    short_url: code("bbb"),
                    owner_id: owner("u1")
                },
            ]
        );
    }

    #[tokio::test]
    async fn zero_interval_is_raised_to_minimum() {
        let sink = RecordingSink::default();
        let queue = DeletionQueue::spawn(sink.clone(), DEFAULT_QUEUE_CAPACITY, Duration::ZERO);

        tokio::time::sleep(INTERVAL).await;
        queue.enqueue(&owner("u1"), &[code("aaa")]).await.unwrap();
        tokio::time::sleep(INTERVAL).await;

        assert!(!queue.is_shut_down());
        let applied = sink.applied();
        assert_eq!(applied.concat().len(), 1);
        assert_eq!(applied[0][0].short_url, code("aaa"));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn idle_ticks_do_not_touch_the_sink() {
        let sink = RecordingSink::default();
        let _queue = DeletionQueue::spawn(sink.clone(), DEFAULT_QUEUE_CAPACITY, INTERVAL);

        tokio::time::sleep(INTERVAL * 4).await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_flush_drops_batch_and_keeps_running() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let queue = DeletionQueue::spawn(sink.clone(), DEFAULT_QUEUE_CAPACITY, INTERVAL);

        queue.enqueue(&owner("u1"), &[code("lost")]).await.unwrap();
        tokio::time::sleep(INTERVAL * 4).await;
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

        sink.failing.store(false, Ordering::SeqCst);
        queue.enqueue(&owner("u1"), &[code("kept")]).await.unwrap();
        tokio::time::sleep(INTERVAL * 4).await;

        let applied = sink.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].len(), 1);
        assert_eq!(applied[0][0].short_url, code("kept"));
    }

    #[tokio::test]
    async fn full_queue_blocks_producer() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Semaphore::new(0));
        let sink = BlockingSink {
            entered: entered.clone(),
            release: release.clone(),
        };
        let queue = DeletionQueue::spawn(sink, 1, Duration::from_millis(20));

        // first entry is accumulated, then the worker parks inside the flush
        queue.enqueue(&owner("u1"), &[code("first")]).await.unwrap();
        entered.notified().await;

        // fills the single slot
        queue.enqueue(&owner("u1"), &[code("second")]).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            queue.enqueue(&owner("u1"), &[code("third")]),
        )
        .await;
        assert!(blocked.is_err(), "enqueue should wait while the queue is full");

        release.add_permits(1_000);
        tokio::time::timeout(
            Duration::from_secs(1),
            queue.enqueue(&owner("u1"), &[code("third")]),
        )
        .await
        .expect("enqueue should proceed once the worker drains")
        .unwrap();
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_entries() {
        let sink = RecordingSink::default();
        let queue = DeletionQueue::spawn(sink.clone(), DEFAULT_QUEUE_CAPACITY, Duration::from_secs(3600));

        queue
            .enqueue(&owner("u1"), &[code("aaa"), code("bbb"), code("ccc")])
            .await
            .unwrap();
        queue.shutdown().await;

        let applied = sink.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].len(), 3);
        assert!(queue.is_shut_down());

        let err = queue.enqueue(&owner("u1"), &[code("ddd")]).await.unwrap_err();
        assert!(matches!(err, StorageError::Operation(_)));

        // second shutdown is a no-op
        queue.shutdown().await;
    }
}
