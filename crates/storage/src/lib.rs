//! Storage Layer
//!
//! Trip and score persistence behind the [`TripStore`] trait, with an in-memory store
//! and a SQLite store. Score records are unique per trip.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use trip_model::{DriverScore, ModelError, Trip, TripStatus};
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Trip {0} not found")]
    NotFound(Uuid),
    #[error("Trip {0} already exists")]
    DuplicateTrip(Uuid),
    #[error("Trip {trip_id}: {source}")]
    InvalidTransition {
        trip_id: Uuid,
        #[source]
        source: ModelError,
    },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    fn transition(trip_id: Uuid, from: TripStatus, to: TripStatus) -> Self {
        StorageError::InvalidTransition {
            trip_id,
            source: ModelError::InvalidTransition { from, to },
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Result of attempting to claim a trip for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Trip moved `PENDING_ANALYSIS -> PROCESSING`
    Claimed,
    /// Trip exists but is not pending
    NotClaimable(TripStatus),
    /// No such trip
    Missing,
}

/// Result of an insert-if-absent on the score table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreInsert {
    Inserted,
    /// A score for the trip already existed; nothing was written
    AlreadyExists,
}

/// Persistence operations used by ingestion, workers and lookups
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Persist a new trip
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StorageError>;

    async fn fetch_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StorageError>;

    async fn trip_status(&self, trip_id: Uuid) -> Result<Option<TripStatus>, StorageError>;

    /// Compare-and-set `PENDING_ANALYSIS -> PROCESSING`
    async fn claim_trip(&self, trip_id: Uuid) -> Result<ClaimOutcome, StorageError>;

    /// Validated status transition, returning the previous status
    async fn update_status(&self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError>;

    async fn insert_score_if_absent(&self, score: &DriverScore) -> Result<ScoreInsert, StorageError>;

    /// Atomically insert the score (if absent) and move the trip `PROCESSING -> COMPLETED`
    async fn complete_trip(
        &self,
        score: &DriverScore,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<ScoreInsert, StorageError>;

    /// Move the trip `PROCESSING -> FAILED`
    async fn fail_trip(&self, trip_id: Uuid) -> Result<(), StorageError> {
        self.update_status(trip_id, TripStatus::Failed).await.map(|_| ())
    }

    async fn fetch_score(&self, trip_id: Uuid) -> Result<Option<DriverScore>, StorageError>;

    /// Trips that entered `PROCESSING` before `cutoff`
    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError>;

    /// Trips still `PENDING_ANALYSIS` that were created before `cutoff`
    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError>;
}
