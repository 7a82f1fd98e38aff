//! Bounded queue plus a fixed number of workers.
//!
//! Submissions never wait: when the queue is full the item is handed back
//! with [`QueueError::Full`] so the caller can tell the channel the
//! service is busy. Workers share one receiver; each takes the next item,
//! runs the generation, and delivers the result. Cancelling the pool's
//! token stops the workers and aborts in-flight polls and retry sleeps.
//! Every accepted item still gets a message: interrupted and still-queued
//! requests are told the service shut down.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelgen_core::generation::GenerationRequest;
use reelgen_core::result::GenerationResult;
use reelgen_pipeline::Orchestrator;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::delivery::Delivery;

pub const DEFAULT_WORKER_COUNT: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// One queued generation and where to send its result.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub channel: String,
    pub request: GenerationRequest,
    pub received_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(channel: impl Into<String>, request: GenerationRequest) -> Self {
        Self {
            id: Uuid::now_v7(),
            channel: channel.into(),
            request,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity; the item is returned untouched.
    #[error("Work queue is full")]
    Full(WorkItem),

    #[error("Work queue is closed")]
    Closed(WorkItem),
}

/// Anything that can run a generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult;
}

#[async_trait]
impl Generator for Orchestrator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        Orchestrator::generate(self, request, cancel).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkQueue
// ---------------------------------------------------------------------------

/// Cloneable submission handle.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// Enqueue without waiting.
    pub fn submit(&self, item: WorkItem) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => QueueError::Full(item),
            mpsc::error::TrySendError::Closed(item) => QueueError::Closed(item),
        })
    }

    /// Items waiting for a worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    delivery: Arc<Delivery>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn the workers and return the pool together with its queue.
    pub fn start(
        config: PoolConfig,
        generator: Arc<dyn Generator>,
        delivery: Arc<Delivery>,
        cancel: CancellationToken,
    ) -> (Self, WorkQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.worker_count.max(1))
            .map(|index| {
                tokio::spawn(run_worker(
                    index,
                    Arc::clone(&rx),
                    Arc::clone(&generator),
                    Arc::clone(&delivery),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.worker_count.max(1),
            queue_capacity = config.queue_capacity.max(1),
            "Worker pool started",
        );

        let pool = Self {
            workers,
            rx,
            delivery,
            cancel,
        };
        (pool, WorkQueue { tx })
    }

    /// Cancel in-flight work, wait for every worker to exit, then close
    /// the queue and notify the channels of items that never started.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut dropped = 0usize;
        while let Ok(item) = rx.try_recv() {
            dropped += 1;
            if let Err(e) = self.delivery.notify_shutdown(&item.channel).await {
                tracing::error!(request_id = %item.id, error = %e, "Failed to post shutdown notice");
            }
        }
        tracing::info!(dropped, "Worker pool stopped");
    }
}

async fn run_worker(
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    generator: Arc<dyn Generator>,
    delivery: Arc<Delivery>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = async { rx.lock().await.recv().await } => item,
        };
        let Some(item) = item else {
            break;
        };

        let span = tracing::info_span!(
            "work_item",
            worker = index,
            request_id = %item.id,
            channel = %item.channel,
        );
        process(item, generator.as_ref(), &delivery, &cancel)
            .instrument(span)
            .await;
    }
    tracing::debug!(worker = index, "Worker exiting");
}

async fn process(
    item: WorkItem,
    generator: &dyn Generator,
    delivery: &Delivery,
    cancel: &CancellationToken,
) {
    let queued_ms = (Utc::now() - item.received_at).num_milliseconds();
    tracing::info!(queued_ms, prompt = %item.request.prompt(), "Generation started");

    let result = generator.generate(&item.request, cancel).await;
    if cancel.is_cancelled() {
        tracing::info!("Shutdown during generation, result not delivered");
        if let Err(e) = delivery.notify_shutdown(&item.channel).await {
            tracing::error!(error = %e, "Failed to post shutdown notice");
        }
        return;
    }

    if let Err(e) = delivery.deliver(&item.channel, result).await {
        tracing::error!(error = %e, "Result delivery failed");
    }
}
