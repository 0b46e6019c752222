//! Trip state manager
//!
//! Single place where trips are created and moved between statuses. Every transition
//! is validated by the store and logged.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use storage::{ClaimOutcome, ScoreInsert, StorageError, TripStore};
use tracing::{info, warn};
use trip_model::{DriverScore, TelemetrySample, Trip, TripStatus};
use uuid::Uuid;

/// Creates trips and applies status transitions
#[derive(Clone)]
pub struct TripStateManager {
    store: Arc<dyn TripStore>,
}

impl TripStateManager {
    pub fn new(store: Arc<dyn TripStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TripStore> {
        &self.store
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StorageError> {
        self.store.fetch_trip(trip_id).await
    }

    /// Create a trip in `PENDING_ANALYSIS`
    pub async fn initialize_trip(
        &self,
        vehicle_id: Uuid,
        driver_id: Uuid,
        start_time: DateTime<Utc>,
        samples: Vec<TelemetrySample>,
    ) -> Result<Trip, StorageError> {
        let trip = Trip::new(vehicle_id, driver_id, start_time, samples);
        self.store.insert_trip(&trip).await?;
        info!(
            "Trip initialized: {} ({}, {} samples)",
            trip.id,
            trip.status,
            trip.samples.len()
        );
        Ok(trip)
    }

    /// `PENDING_ANALYSIS -> PROCESSING`
    pub async fn claim(&self, trip_id: Uuid) -> Result<ClaimOutcome, StorageError> {
        let outcome = self.store.claim_trip(trip_id).await?;
        match outcome {
            ClaimOutcome::Claimed => log_transition(trip_id, TripStatus::PendingAnalysis, TripStatus::Processing),
            ClaimOutcome::NotClaimable(status) => {
                warn!("Trip {} not claimable in status {}", trip_id, status)
            }
            ClaimOutcome::Missing => warn!("Trip {} not found", trip_id),
        }
        Ok(outcome)
    }

    /// Persist the score and `PROCESSING -> COMPLETED` in one unit
    pub async fn complete(&self, score: &DriverScore, end_time: Option<DateTime<Utc>>) -> Result<ScoreInsert, StorageError> {
        let outcome = self.store.complete_trip(score, end_time).await?;
        if outcome == ScoreInsert::AlreadyExists {
            warn!("Score for trip {} already present, keeping existing record", score.trip_id);
        }
        log_transition(score.trip_id, TripStatus::Processing, TripStatus::Completed);
        Ok(outcome)
    }

    /// `PROCESSING -> FAILED`
    pub async fn fail(&self, trip_id: Uuid) -> Result<(), StorageError> {
        let previous = self.store.update_status(trip_id, TripStatus::Failed).await?;
        log_transition(trip_id, previous, TripStatus::Failed);
        Ok(())
    }
}

fn log_transition(trip_id: Uuid, from: TripStatus, to: TripStatus) {
    info!("State transition: trip {} | {} -> {}", trip_id, from, to);
}
