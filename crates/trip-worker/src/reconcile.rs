//! Reconciliation of stranded trips
//!
//! A worker that dies between claim and completion leaves its trip in `PROCESSING`
//! forever; the sweep moves such trips to `FAILED`. A job acked without the trip being
//! claimed (storage down at claim time) leaves it in `PENDING_ANALYSIS` with nothing
//! queued; the sweep publishes those ids again. Both apply only past the configured age.

use crate::queue::JobQueue;
use crate::WorkerError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use storage::{StorageError, TripStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What one sweep changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Moved `PROCESSING` -> `FAILED`
    pub failed: Vec<Uuid>,
    /// `PENDING_ANALYSIS` trips published again
    pub requeued: Vec<Uuid>,
}

/// Fail trips stuck in `PROCESSING` and re-drive orphaned `PENDING_ANALYSIS` trips,
/// considering only those untouched for longer than `older_than`.
///
/// Pending trips are republished only while the queue is empty, so a backlog is never
/// mistaken for orphans. A duplicate job is harmless: the claim lets one job through.
pub async fn reconcile_stale(
    store: &dyn TripStore,
    queue: &dyn JobQueue,
    older_than: Duration,
) -> Result<ReconcileReport, WorkerError> {
    let cutoff = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut report = ReconcileReport::default();
    for trip_id in store.stale_processing(cutoff).await? {
        match store.fail_trip(trip_id).await {
            Ok(()) => {
                warn!("Reconciled stale trip {}: PROCESSING -> FAILED", trip_id);
                report.failed.push(trip_id);
            }
            // Completed or failed by its worker since the scan
            Err(StorageError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    if queue.depth() == 0 {
        for trip_id in store.stale_pending(cutoff).await? {
            queue.publish(trip_id).await?;
            warn!("Re-queued orphaned trip {} still PENDING_ANALYSIS", trip_id);
            report.requeued.push(trip_id);
        }
    }

    if !report.failed.is_empty() {
        metrics::counter!("fleetflow_trips_reconciled_total").increment(report.failed.len() as u64);
    }
    if !report.requeued.is_empty() {
        metrics::counter!("fleetflow_trips_requeued_total").increment(report.requeued.len() as u64);
    }
    Ok(report)
}

/// Run the sweep every `interval` until shutdown
pub fn spawn_reconciler(
    store: Arc<dyn TripStore>,
    queue: Arc<dyn JobQueue>,
    older_than: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Reconciler started: threshold {:?}, interval {:?}",
            older_than, interval
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = reconcile_stale(store.as_ref(), queue.as_ref(), older_than).await {
                        error!("Reconciliation sweep failed: {}", e);
                    }
                }
            }
        }

        info!("Reconciler stopped");
    })
}
