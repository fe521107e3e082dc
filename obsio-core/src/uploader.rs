//! Asynchronous upload pipeline for recorded simulation steps.
//!
//! The producer (the session tick loop) calls `put` and is never delayed:
//! the ingress queue is bounded and overflow drops the item with a warning.
//! A fixed pool of worker tasks drains the queue in batches, resolves each
//! payload to a content key (hash, then conditional upload), and commits the
//! batch's transition rows in one transaction. No pipeline error ever
//! reaches the producer; a failed batch is logged and the worker moves on.

use crate::encode::{blob_name, content_key, encode_observation};
use crate::error::Result;
use crate::record::{Observation, StepUpload, TransitionRecord};
use crate::sink::TransitionSink;
use crate::storage::{upload_if_absent, BlobStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Number of worker tasks draining the queue.
    pub num_workers: usize,
    /// Ingress queue capacity. When full, `put` drops the item.
    pub queue_capacity: usize,
    /// Maximum items per committed batch.
    pub batch_size: usize,
    /// Maximum time a worker waits for a batch to fill after its first item.
    pub max_batch_wait: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            queue_capacity: 1024,
            batch_size: 8,
            max_batch_wait: Duration::from_millis(500),
        }
    }
}

/// Outstanding-item accounting for the drain guarantee: incremented on
/// successful enqueue, decremented once per item at its terminal outcome
/// (committed or logged-as-failed).
struct PendingCounter {
    count: AtomicUsize,
    drained: Notify,
}

impl PendingCounter {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    fn complete(&self, n: usize) {
        let previous = self.count.fetch_sub(n, Ordering::AcqRel);
        if previous == n {
            self.drained.notify_waiters();
        }
    }

    fn outstanding(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_drained(&self) {
        loop {
            // Register for the wakeup before reading the counter, otherwise a
            // completion between the read and the await is lost.
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Multi-worker upload queue for real-time recording of session steps.
pub struct Uploader {
    config: UploaderConfig,
    tx: mpsc::Sender<StepUpload>,
    rx: Arc<Mutex<mpsc::Receiver<StepUpload>>>,
    pending: Arc<PendingCounter>,
    store: Arc<dyn BlobStore>,
    sink: Arc<dyn TransitionSink>,
    workers: Vec<JoinHandle<()>>,
}

impl Uploader {
    pub fn new(
        config: UploaderConfig,
        store: Arc<dyn BlobStore>,
        sink: Arc<dyn TransitionSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            config,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            pending: Arc::new(PendingCounter::new()),
            store,
            sink,
            workers: Vec::new(),
        }
    }

    /// Spawn the worker tasks. A no-op when workers are already running.
    pub fn start(&mut self) {
        if !self.workers.is_empty() {
            return;
        }

        for worker_id in 0..self.config.num_workers.max(1) {
            let rx = Arc::clone(&self.rx);
            let store = Arc::clone(&self.store);
            let sink = Arc::clone(&self.sink);
            let pending = Arc::clone(&self.pending);
            let batch_size = self.config.batch_size.max(1);
            let max_wait = self.config.max_batch_wait;

            self.workers.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, store, sink, pending, batch_size, max_wait).await;
            }));
        }

        tracing::info!("Uploader started with {} worker tasks", self.workers.len());
    }

    /// Enqueue a step for upload. Never blocks: if the queue is at capacity
    /// the item is dropped and a warning is logged.
    pub fn put(&self, item: StepUpload) {
        self.pending.add(1);

        if let Err(error) = self.tx.try_send(item) {
            self.pending.complete(1);
            match error {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Uploader: queue is full; dropping step");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("Uploader: queue is closed; dropping step");
                }
            }
        }
    }

    /// Number of enqueued items that have not yet reached a terminal outcome.
    pub fn pending(&self) -> usize {
        self.pending.outstanding()
    }

    /// Drain the queue, then stop the workers and release the backend.
    ///
    /// Every item enqueued before this call reaches a terminal outcome
    /// before the workers are cancelled. Items enqueued concurrently with or
    /// after the drain have no processing guarantee.
    pub async fn close(&mut self) {
        if !self.workers.is_empty() {
            tracing::info!("Uploader: stopping workers...");

            self.pending.wait_drained().await;

            for handle in &self.workers {
                handle.abort();
            }
            for handle in self.workers.drain(..) {
                let _ = handle.await;
            }

            tracing::info!("Uploader: all workers stopped");
        }

        // The backend is released even when no worker was ever started.
        if let Err(error) = self.store.close().await {
            tracing::error!("Uploader: backend close failed: {}", error);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<StepUpload>>>,
    store: Arc<dyn BlobStore>,
    sink: Arc<dyn TransitionSink>,
    pending: Arc<PendingCounter>,
    batch_size: usize,
    max_wait: Duration,
) {
    tracing::info!("Upload worker {} started", worker_id);

    while let Some(batch) = next_batch(&rx, batch_size, max_wait).await {
        let batch_len = batch.len();

        match resolve_and_commit(batch, store.as_ref(), sink.as_ref()).await {
            Ok(()) => {
                tracing::debug!("Worker {} committed batch of {}", worker_id, batch_len);
            }
            Err(error) => {
                tracing::error!(
                    "Worker {} dropped batch of {}: {}",
                    worker_id,
                    batch_len,
                    error
                );
            }
        }

        pending.complete(batch_len);
    }

    tracing::info!("Upload worker {} stopped", worker_id);
}

/// Assemble one batch: block for the first item, then collect more under a
/// deadline of `max_wait` past the first item, stopping at `batch_size`.
///
/// The receiver lock is held for the whole assembly, so a batch is one
/// worker's contiguous slice of the queue stream. Returns `None` once the
/// channel is closed and fully drained.
async fn next_batch(
    rx: &Mutex<mpsc::Receiver<StepUpload>>,
    batch_size: usize,
    max_wait: Duration,
) -> Option<Vec<StepUpload>> {
    let mut rx = rx.lock().await;

    let first = rx.recv().await?;
    let deadline = Instant::now() + max_wait;
    let mut batch = vec![first];

    while batch.len() < batch_size {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(item)) => batch.push(item),
            // Channel closed or max_wait elapsed: ship what we have.
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch)
}

/// Resolve every payload in the batch to a content key, then commit the
/// batch's records in one transaction. Any failure abandons the whole
/// batch's persistence; blobs uploaded before the failure stay behind and
/// are harmless (content-addressed, idempotent).
async fn resolve_and_commit(
    batch: Vec<StepUpload>,
    store: &dyn BlobStore,
    sink: &dyn TransitionSink,
) -> Result<()> {
    let mut records: Vec<TransitionRecord> = Vec::with_capacity(batch.len());

    for item in batch {
        let StepUpload {
            mut record,
            obs,
            next_obs,
        } = item;

        record.obs_key = Some(resolve_payload(&obs, store).await?);
        if let Some(next) = &next_obs {
            record.next_obs_key = Some(resolve_payload(next, store).await?);
        }

        records.push(record);
    }

    sink.commit_batch(&records).await
}

/// Encode, hash, and conditionally upload one payload. Returns its key.
async fn resolve_payload(obs: &Observation, store: &dyn BlobStore) -> Result<String> {
    let data = encode_observation(obs)?;
    let key = content_key(&data);
    upload_if_absent(store, &blob_name(&key), data).await?;
    Ok(key)
}
