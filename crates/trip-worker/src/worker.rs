//! Telemetry worker
//!
//! Processes one job at a time. Each job ends in exactly one acknowledgement, whatever
//! the outcome; failed trips are never retried automatically.

use crate::queue::{Delivery, JobQueue};
use crate::state_machine::TripStateManager;
use safety_scoring::{Analyzer, ScoringError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use storage::{ClaimOutcome, ScoreInsert, TripStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use trip_model::{DriverScore, Trip, TripMetrics, TripStatus};
use uuid::Uuid;

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Scored and moved to `COMPLETED`
    Completed { trip_id: Uuid, safety_score: u32 },
    /// Redelivery of a trip that is already `COMPLETED`
    AlreadyCompleted { trip_id: Uuid },
    /// Trip is in a status this job cannot act on (`PROCESSING` elsewhere, or `FAILED`)
    Skipped { trip_id: Uuid, status: TripStatus },
    /// Scoring or persistence failed; trip moved to `FAILED`
    Failed { trip_id: Uuid, reason: String },
    /// Storage unavailable when claiming; trip left `PENDING_ANALYSIS` for the reconciler
    Abandoned { trip_id: Uuid, reason: String },
    /// No such trip; discarded
    UnknownTrip { trip_id: Uuid },
    /// Message body is not a trip id; discarded
    InvalidMessage { body: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed { .. } => "completed",
            JobOutcome::AlreadyCompleted { .. } => "already_completed",
            JobOutcome::Skipped { .. } => "skipped",
            JobOutcome::Failed { .. } => "failed",
            JobOutcome::Abandoned { .. } => "abandoned",
            JobOutcome::UnknownTrip { .. } => "unknown_trip",
            JobOutcome::InvalidMessage { .. } => "invalid_message",
        }
    }
}

/// Consumes trip ids from a queue and scores the trips
pub struct TelemetryWorker {
    id: usize,
    state: TripStateManager,
    queue: Arc<dyn JobQueue>,
    analyzer: Arc<dyn Analyzer>,
}

impl TelemetryWorker {
    pub fn new(
        id: usize,
        store: Arc<dyn TripStore>,
        queue: Arc<dyn JobQueue>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            id,
            state: TripStateManager::new(store),
            queue,
            analyzer,
        }
    }

    /// Pull jobs until the queue closes or shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker {} listening for jobs", self.id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                delivery = self.queue.next() => delivery,
            };

            match delivery {
                Some(delivery) => {
                    self.process(delivery).await;
                }
                None => {
                    info!("Worker {}: queue closed", self.id);
                    break;
                }
            }
        }

        info!("Worker {} stopped", self.id);
    }

    /// Handle one delivery and acknowledge it
    pub async fn process(&self, delivery: Delivery) -> JobOutcome {
        let outcome = match delivery.trip_id() {
            Ok(trip_id) => {
                debug!("Worker {} received trip {}", self.id, trip_id);
                self.handle(trip_id).await
            }
            Err(e) => {
                error!("Invalid message body {:?}: {}", delivery.body(), e);
                JobOutcome::InvalidMessage {
                    body: delivery.body().to_string(),
                }
            }
        };

        delivery.ack();
        metrics::counter!("fleetflow_jobs_processed_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn handle(&self, trip_id: Uuid) -> JobOutcome {
        // Claim before loading, so a trip that cannot be loaded still reaches a terminal state
        match self.state.claim(trip_id).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::NotClaimable(TripStatus::Completed)) => {
                info!("Trip {} already completed, ignoring redelivery", trip_id);
                return JobOutcome::AlreadyCompleted { trip_id };
            }
            Ok(ClaimOutcome::NotClaimable(status)) => return JobOutcome::Skipped { trip_id, status },
            Ok(ClaimOutcome::Missing) => {
                warn!("Trip {} not found, discarding job", trip_id);
                return JobOutcome::UnknownTrip { trip_id };
            }
            Err(e) => {
                error!("Could not claim trip {}, leaving it pending: {}", trip_id, e);
                return JobOutcome::Abandoned {
                    trip_id,
                    reason: e.to_string(),
                };
            }
        }

        let result = match self.state.get_trip(trip_id).await {
            Ok(Some(trip)) => self.score_and_complete(&trip).await,
            Ok(None) => Err(format!("trip {} disappeared after claim", trip_id)),
            Err(e) => Err(format!("could not load trip: {}", e)),
        };

        match result {
            Ok(safety_score) => {
                info!("Trip {} completed with safety score {}", trip_id, safety_score);
                metrics::histogram!("fleetflow_safety_score").record(safety_score as f64);
                JobOutcome::Completed { trip_id, safety_score }
            }
            Err(reason) => {
                error!("Processing trip {} failed: {}", trip_id, reason);
                if let Err(e) = self.state.fail(trip_id).await {
                    error!("Could not mark trip {} as FAILED: {}", trip_id, e);
                }
                JobOutcome::Failed { trip_id, reason }
            }
        }
    }

    async fn score_and_complete(&self, trip: &Trip) -> Result<u32, String> {
        let metrics = self.analyze(trip).map_err(|e| e.to_string())?;
        debug!("Trip {} metrics: {:?}", trip.id, metrics);

        let safety_score = metrics.safety_score;
        let score = DriverScore::for_trip(trip, metrics);

        match self.state.complete(&score, trip.last_sample_time()).await {
            Ok(ScoreInsert::Inserted) | Ok(ScoreInsert::AlreadyExists) => Ok(safety_score),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Run the analyzer, turning a panic into a scoring error
    fn analyze(&self, trip: &Trip) -> Result<TripMetrics, ScoringError> {
        catch_unwind(AssertUnwindSafe(|| self.analyzer.analyze(&trip.samples))).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "analyzer panicked".to_string());
            Err(ScoringError::Analysis(message))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use safety_scoring::Scorer;
    use storage::{MemoryStore, StorageError};
    use trip_model::TelemetrySample;

    struct FailingAnalyzer;

    impl Analyzer for FailingAnalyzer {
        fn analyze(&self, _samples: &[TelemetrySample]) -> Result<TripMetrics, ScoringError> {
            Err(ScoringError::Analysis("Test Exception".to_string()))
        }
    }

    struct PanickingAnalyzer;

    impl Analyzer for PanickingAnalyzer {
        fn analyze(&self, _samples: &[TelemetrySample]) -> Result<TripMetrics, ScoringError> {
            panic!("boom")
        }
    }

    /// Memory store with switchable failures per operation
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_claim: bool,
        fail_fetch: bool,
        fail_complete: bool,
    }

    impl FlakyStore {
        fn unavailable(&self, broken: bool) -> Result<(), StorageError> {
            if broken {
                Err(StorageError::DatabaseError("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TripStore for FlakyStore {
        async fn insert_trip(&self, trip: &Trip) -> Result<(), StorageError> {
            self.inner.insert_trip(trip).await
        }
        async fn fetch_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StorageError> {
            self.unavailable(self.fail_fetch)?;
            self.inner.fetch_trip(trip_id).await
        }
        async fn trip_status(&self, trip_id: Uuid) -> Result<Option<TripStatus>, StorageError> {
            self.inner.trip_status(trip_id).await
        }
        async fn claim_trip(&self, trip_id: Uuid) -> Result<ClaimOutcome, StorageError> {
            self.unavailable(self.fail_claim)?;
            self.inner.claim_trip(trip_id).await
        }
        async fn update_status(&self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError> {
            self.inner.update_status(trip_id, next).await
        }
        async fn insert_score_if_absent(&self, score: &DriverScore) -> Result<ScoreInsert, StorageError> {
            self.inner.insert_score_if_absent(score).await
        }
        async fn complete_trip(
            &self,
            score: &DriverScore,
            end_time: Option<DateTime<Utc>>,
        ) -> Result<ScoreInsert, StorageError> {
            self.unavailable(self.fail_complete)?;
            self.inner.complete_trip(score, end_time).await
        }
        async fn fetch_score(&self, trip_id: Uuid) -> Result<Option<DriverScore>, StorageError> {
            self.inner.fetch_score(trip_id).await
        }
        async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
            self.inner.stale_processing(cutoff).await
        }
        async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
            self.inner.stale_pending(cutoff).await
        }
    }

    async fn flaky_setup(store: FlakyStore) -> (Arc<FlakyStore>, Arc<MemoryQueue>, TelemetryWorker, Trip) {
        let store = Arc::new(store);
        let queue = Arc::new(MemoryQueue::new());
        let worker = TelemetryWorker::new(0, store.clone(), queue.clone(), Arc::new(Scorer::default()));

        let trip = Trip::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now(), scenario_samples());
        store.insert_trip(&trip).await.unwrap();
        queue.publish(trip.id).await.unwrap();
        (store, queue, worker, trip)
    }

    struct Harness {
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        worker: TelemetryWorker,
    }

    fn harness(analyzer: Arc<dyn Analyzer>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let worker = TelemetryWorker::new(0, store.clone(), queue.clone(), analyzer);
        Harness { store, queue, worker }
    }

    fn scenario_samples() -> Vec<TelemetrySample> {
        [0.1, -0.5, 0.1, 0.6]
            .into_iter()
            .enumerate()
            .map(|(i, g)| TelemetrySample {
                timestamp: Some(format!("2024-06-01T12:00:{:02}", i * 5)),
                speed_kmh: 50.0,
                g_force_long: g,
                ..Default::default()
            })
            .collect()
    }

    async fn submit(store: &MemoryStore, queue: &MemoryQueue, samples: Vec<TelemetrySample>) -> Trip {
        let trip = Trip::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now(), samples);
        store.insert_trip(&trip).await.unwrap();
        queue.publish(trip.id).await.unwrap();
        trip
    }

    #[tokio::test]
    async fn test_success_path() {
        let h = harness(Arc::new(Scorer::default()));
        let trip = submit(&h.store, &h.queue, scenario_samples()).await;

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                trip_id: trip.id,
                safety_score: 96
            }
        );

        let stored = h.store.fetch_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::Completed);
        assert!(stored.end_time.is_some());

        let score = h.store.fetch_score(trip.id).await.unwrap().unwrap();
        assert_eq!(score.metrics.harsh_braking_count, 1);
        assert_eq!(score.metrics.rapid_accel_count, 1);
        assert_eq!(h.queue.acked(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_creates_no_second_score() {
        let h = harness(Arc::new(Scorer::default()));
        let trip = submit(&h.store, &h.queue, scenario_samples()).await;
        h.queue.publish(trip.id).await.unwrap();

        h.worker.process(h.queue.try_next().unwrap()).await;
        let second = h.worker.process(h.queue.try_next().unwrap()).await;

        assert_eq!(second, JobOutcome::AlreadyCompleted { trip_id: trip.id });
        assert_eq!(h.store.score_count(), 1);
        assert_eq!(h.queue.acked(), 2);
    }

    #[tokio::test]
    async fn test_unknown_trip_is_discarded() {
        let h = harness(Arc::new(Scorer::default()));
        let missing = Uuid::new_v4();
        h.queue.publish(missing).await.unwrap();

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert_eq!(outcome, JobOutcome::UnknownTrip { trip_id: missing });
        assert_eq!(h.store.trip_count(), 0);
        assert_eq!(h.queue.acked(), 1);
        assert_eq!(h.queue.depth(), 0);
        assert_eq!(h.queue.requeued(), 0);
    }

    #[tokio::test]
    async fn test_scoring_error_fails_trip() {
        let h = harness(Arc::new(FailingAnalyzer));
        let trip = submit(&h.store, &h.queue, scenario_samples()).await;

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert!(matches!(outcome, JobOutcome::Failed { reason, .. } if reason.contains("Test Exception")));
        assert_eq!(h.store.trip_status(trip.id).await.unwrap(), Some(TripStatus::Failed));
        assert!(h.store.fetch_score(trip.id).await.unwrap().is_none());
        assert_eq!(h.queue.acked(), 1);
    }

    #[tokio::test]
    async fn test_analyzer_panic_is_contained() {
        let h = harness(Arc::new(PanickingAnalyzer));
        let trip = submit(&h.store, &h.queue, scenario_samples()).await;

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert!(matches!(outcome, JobOutcome::Failed { reason, .. } if reason.contains("boom")));
        assert_eq!(h.store.trip_status(trip.id).await.unwrap(), Some(TripStatus::Failed));
        assert_eq!(h.queue.acked(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_trip() {
        let (store, queue, worker, trip) = flaky_setup(FlakyStore {
            fail_complete: true,
            ..Default::default()
        })
        .await;

        let outcome = worker.process(queue.try_next().unwrap()).await;
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        assert_eq!(store.trip_status(trip.id).await.unwrap(), Some(TripStatus::Failed));
        assert!(store.fetch_score(trip.id).await.unwrap().is_none());
        assert_eq!(queue.acked(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_trip_fails_after_claim() {
        let (store, queue, worker, trip) = flaky_setup(FlakyStore {
            fail_fetch: true,
            ..Default::default()
        })
        .await;

        let outcome = worker.process(queue.try_next().unwrap()).await;
        assert!(matches!(outcome, JobOutcome::Failed { reason, .. } if reason.contains("could not load trip")));
        assert_eq!(store.trip_status(trip.id).await.unwrap(), Some(TripStatus::Failed));
        assert_eq!(queue.acked(), 1);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_claim_failure_abandons_and_leaves_pending() {
        let (store, queue, worker, trip) = flaky_setup(FlakyStore {
            fail_claim: true,
            ..Default::default()
        })
        .await;

        let outcome = worker.process(queue.try_next().unwrap()).await;
        assert!(matches!(outcome, JobOutcome::Abandoned { trip_id, reason } if trip_id == trip.id && reason.contains("disk full")));
        assert_eq!(
            store.trip_status(trip.id).await.unwrap(),
            Some(TripStatus::PendingAnalysis)
        );
        assert_eq!(queue.acked(), 1);
        assert_eq!(queue.requeued(), 0);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_failed_trip_is_not_retried() {
        let h = harness(Arc::new(FailingAnalyzer));
        let trip = submit(&h.store, &h.queue, scenario_samples()).await;
        h.queue.publish(trip.id).await.unwrap();

        h.worker.process(h.queue.try_next().unwrap()).await;
        let second = h.worker.process(h.queue.try_next().unwrap()).await;
        assert_eq!(
            second,
            JobOutcome::Skipped {
                trip_id: trip.id,
                status: TripStatus::Failed
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_message_acked() {
        let h = harness(Arc::new(Scorer::default()));
        h.queue.publish_raw("garbage").unwrap();

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert_eq!(
            outcome,
            JobOutcome::InvalidMessage {
                body: "garbage".to_string()
            }
        );
        assert_eq!(h.queue.acked(), 1);
    }

    #[tokio::test]
    async fn test_empty_trip_completes_neutral() {
        let h = harness(Arc::new(Scorer::default()));
        let trip = submit(&h.store, &h.queue, Vec::new()).await;

        let outcome = h.worker.process(h.queue.try_next().unwrap()).await;
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                trip_id: trip.id,
                safety_score: 100
            }
        );
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let h = harness(Arc::new(Scorer::default()));
        let a = submit(&h.store, &h.queue, scenario_samples()).await;
        let b = submit(&h.store, &h.queue, Vec::new()).await;
        h.queue.close();

        let (_tx, rx) = watch::channel(false);
        h.worker.run(rx).await;

        for id in [a.id, b.id] {
            assert_eq!(h.store.trip_status(id).await.unwrap(), Some(TripStatus::Completed));
        }
        assert_eq!(h.queue.acked(), 2);
    }
}
