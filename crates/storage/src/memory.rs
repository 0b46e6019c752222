//! In-memory store

use crate::{ClaimOutcome, ScoreInsert, StorageError, TripStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use trip_model::{DriverScore, Trip, TripStatus};
use uuid::Uuid;

struct StoredTrip {
    trip: Trip,
    status_changed_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    trips: HashMap<Uuid, StoredTrip>,
    scores: HashMap<Uuid, DriverScore>,
}

impl State {
    fn set_status(&mut self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError> {
        let stored = self.trips.get_mut(&trip_id).ok_or(StorageError::NotFound(trip_id))?;
        let previous = stored.trip.status;
        if !previous.can_transition_to(next) {
            return Err(StorageError::transition(trip_id, previous, next));
        }
        stored.trip.status = next;
        stored.status_changed_at = Utc::now();
        Ok(previous)
    }
}

/// Store backed by a single mutex; every operation is atomic
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Creating in-memory trip store");
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    fn in_status_since(&self, status: TripStatus, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let state = self.lock()?;
        let mut matching: Vec<_> = state
            .trips
            .values()
            .filter(|s| s.trip.status == status && s.status_changed_at < cutoff)
            .collect();
        matching.sort_by_key(|s| s.status_changed_at);
        Ok(matching.into_iter().map(|s| s.trip.id).collect())
    }

    pub fn trip_count(&self) -> usize {
        self.state.lock().map(|s| s.trips.len()).unwrap_or(0)
    }

    pub fn score_count(&self) -> usize {
        self.state.lock().map(|s| s.scores.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.trips.contains_key(&trip.id) {
            return Err(StorageError::DuplicateTrip(trip.id));
        }
        state.trips.insert(
            trip.id,
            StoredTrip {
                trip: trip.clone(),
                status_changed_at: Utc::now(),
            },
        );
        debug!("Inserted trip {} with {} samples", trip.id, trip.samples.len());
        Ok(())
    }

    async fn fetch_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StorageError> {
        Ok(self.lock()?.trips.get(&trip_id).map(|s| s.trip.clone()))
    }

    async fn trip_status(&self, trip_id: Uuid) -> Result<Option<TripStatus>, StorageError> {
        Ok(self.lock()?.trips.get(&trip_id).map(|s| s.trip.status))
    }

    async fn claim_trip(&self, trip_id: Uuid) -> Result<ClaimOutcome, StorageError> {
        let mut state = self.lock()?;
        match state.trips.get(&trip_id).map(|s| s.trip.status) {
            None => Ok(ClaimOutcome::Missing),
            Some(TripStatus::PendingAnalysis) => {
                state.set_status(trip_id, TripStatus::Processing)?;
                Ok(ClaimOutcome::Claimed)
            }
            Some(status) => Ok(ClaimOutcome::NotClaimable(status)),
        }
    }

    async fn update_status(&self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError> {
        self.lock()?.set_status(trip_id, next)
    }

    async fn insert_score_if_absent(&self, score: &DriverScore) -> Result<ScoreInsert, StorageError> {
        let mut state = self.lock()?;
        if !state.trips.contains_key(&score.trip_id) {
            return Err(StorageError::NotFound(score.trip_id));
        }
        if state.scores.contains_key(&score.trip_id) {
            return Ok(ScoreInsert::AlreadyExists);
        }
        state.scores.insert(score.trip_id, score.clone());
        Ok(ScoreInsert::Inserted)
    }

    async fn complete_trip(
        &self,
        score: &DriverScore,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<ScoreInsert, StorageError> {
        let mut state = self.lock()?;
        let trip_id = score.trip_id;

        // Validate before writing anything so a rejected transition leaves no score behind
        let current = state
            .trips
            .get(&trip_id)
            .map(|s| s.trip.status)
            .ok_or(StorageError::NotFound(trip_id))?;
        if !current.can_transition_to(TripStatus::Completed) {
            return Err(StorageError::transition(trip_id, current, TripStatus::Completed));
        }

        let outcome = if state.scores.contains_key(&trip_id) {
            ScoreInsert::AlreadyExists
        } else {
            state.scores.insert(trip_id, score.clone());
            ScoreInsert::Inserted
        };

        state.set_status(trip_id, TripStatus::Completed)?;
        if let (Some(end), Some(stored)) = (end_time, state.trips.get_mut(&trip_id)) {
            stored.trip.end_time = Some(end);
        }

        Ok(outcome)
    }

    async fn fetch_score(&self, trip_id: Uuid) -> Result<Option<DriverScore>, StorageError> {
        Ok(self.lock()?.scores.get(&trip_id).cloned())
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        self.in_status_since(TripStatus::Processing, cutoff)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        self.in_status_since(TripStatus::PendingAnalysis, cutoff)
    }
}
