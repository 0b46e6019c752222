//! Trip Processing Workers
//!
//! Drives each queued trip from `PENDING_ANALYSIS` to exactly one terminal state:
//! - Job queue abstraction with an in-process at-least-once transport
//! - Trip state manager (validated, logged transitions)
//! - Scoring workers with one job in flight each
//! - Reconciliation of trips stranded in `PROCESSING` or orphaned in `PENDING_ANALYSIS`

mod pool;
mod queue;
mod reconcile;
mod state_machine;
mod worker;

pub use pool::WorkerPool;
pub use queue::{Acker, Delivery, JobQueue, MemoryQueue};
pub use reconcile::{reconcile_stale, spawn_reconciler, ReconcileReport};
pub use state_machine::TripStateManager;
pub use worker::{JobOutcome, TelemetryWorker};

use serde::{Deserialize, Serialize};
use storage::StorageError;
use thiserror::Error;

/// Worker error types
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Queue closed")]
    QueueClosed,

    #[error("Lock error: {0}")]
    LockPoisoned(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers, each with one job in flight
    pub workers: usize,
    /// Fail trips stuck in `PROCESSING`, and re-queue orphaned pending trips, older than
    /// this (seconds, 0 disables)
    pub reconcile_after_secs: u64,
    /// How often the reconciliation sweep runs (seconds)
    pub reconcile_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            reconcile_after_secs: 0,
            reconcile_interval_secs: 60,
        }
    }
}
