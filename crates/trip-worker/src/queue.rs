//! Job queue
//!
//! Jobs carry only a trip id (claim check). Delivery is at-least-once: a delivery
//! dropped without being acknowledged goes back on the queue.

use crate::WorkerError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Settles a delivery with the transport
pub trait Acker: Send {
    fn ack(self: Box<Self>, tag: u64);
    /// Return the message to the queue
    fn requeue(self: Box<Self>, tag: u64, body: String);
}

/// One queued job
pub struct Delivery {
    tag: u64,
    body: String,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    pub fn new(tag: u64, body: String, acker: Box<dyn Acker>) -> Self {
        Self {
            tag,
            body,
            acker: Some(acker),
        }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn trip_id(&self) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(self.body.trim())
    }

    /// Acknowledge the job. Consumes the delivery, so it can happen only once.
    pub fn ack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.ack(self.tag);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            warn!("Delivery {} dropped without ack, requeueing", self.tag);
            acker.requeue(self.tag, std::mem::take(&mut self.body));
        }
    }
}

/// Work queue transport
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a trip id for analysis
    async fn publish(&self, trip_id: Uuid) -> Result<(), WorkerError>;

    /// Wait for the next job. `None` once the queue is closed and drained.
    async fn next(&self) -> Option<Delivery>;

    /// Jobs waiting to be delivered
    fn depth(&self) -> usize;
}

struct Shared {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    next_tag: AtomicU64,
    waiting: AtomicUsize,
    in_flight: AtomicUsize,
    acked: AtomicU64,
    requeued: AtomicU64,
}

impl Shared {
    fn send(&self, body: String) -> Result<(), WorkerError> {
        let guard = self
            .sender
            .lock()
            .map_err(|e| WorkerError::LockPoisoned(e.to_string()))?;
        let sender = guard.as_ref().ok_or(WorkerError::QueueClosed)?;
        self.waiting.fetch_add(1, Ordering::SeqCst);
        sender.send(body).map_err(|_| {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            WorkerError::QueueClosed
        })
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
}

impl Acker for MemoryAcker {
    fn ack(self: Box<Self>, tag: u64) {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared.acked.fetch_add(1, Ordering::SeqCst);
        debug!("Acked delivery {}", tag);
    }

    fn requeue(self: Box<Self>, tag: u64, body: String) {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared.requeued.fetch_add(1, Ordering::SeqCst);
        if self.shared.send(body).is_err() {
            warn!("Queue closed, delivery {} lost on requeue", tag);
        }
    }
}

/// In-process queue shared by any number of workers
#[derive(Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(tx)),
                next_tag: AtomicU64::new(1),
                waiting: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                acked: AtomicU64::new(0),
                requeued: AtomicU64::new(0),
            }),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Publish an arbitrary message body
    pub fn publish_raw(&self, body: impl Into<String>) -> Result<(), WorkerError> {
        self.shared.send(body.into())
    }

    /// Stop accepting jobs; workers drain what is left
    pub fn close(&self) {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn acked(&self) -> u64 {
        self.shared.acked.load(Ordering::SeqCst)
    }

    pub fn requeued(&self) -> u64 {
        self.shared.requeued.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Next job if one is immediately available
    pub fn try_next(&self) -> Option<Delivery> {
        let mut receiver = self.receiver.try_lock().ok()?;
        let body = receiver.try_recv().ok()?;
        Some(self.deliver(body))
    }

    fn deliver(&self, body: String) -> Delivery {
        self.shared.waiting.fetch_sub(1, Ordering::SeqCst);
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let tag = self.shared.next_tag.fetch_add(1, Ordering::SeqCst);
        Delivery::new(
            tag,
            body,
            Box::new(MemoryAcker {
                shared: Arc::clone(&self.shared),
            }),
        )
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn publish(&self, trip_id: Uuid) -> Result<(), WorkerError> {
        self.shared.send(trip_id.to_string())
    }

    async fn next(&self) -> Option<Delivery> {
        let body = self.receiver.lock().await.recv().await?;
        Some(self.deliver(body))
    }

    fn depth(&self) -> usize {
        self.shared.waiting.load(Ordering::SeqCst)
    }
}
