//! Trip status and score lookups

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trip_model::{DriverScore, TripStatus};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Current status of a trip
#[derive(Debug, Serialize, Deserialize)]
pub struct TripStatusResponse {
    pub trip_id: Uuid,
    pub status: TripStatus,
}

fn parse_trip_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidTripId(raw.to_string()))
}

/// `GET /api/v1/trips/:id/status`
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<TripStatusResponse>, ApiError> {
    let trip_id = parse_trip_id(&raw_id)?;
    let status = state
        .trips
        .store()
        .trip_status(trip_id)
        .await?
        .ok_or(ApiError::TripNotFound(trip_id))?;

    Ok(Json(TripStatusResponse { trip_id, status }))
}

/// `GET /api/v1/trips/:id/score`
pub async fn get_score(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<DriverScore>, ApiError> {
    let trip_id = parse_trip_id(&raw_id)?;
    let store = state.trips.store();

    let status = store
        .trip_status(trip_id)
        .await?
        .ok_or(ApiError::TripNotFound(trip_id))?;

    if status != TripStatus::Completed {
        return Err(ApiError::ScoreNotReady { trip_id, status });
    }

    // Completion writes the score in the same transaction as the status
    let score = store
        .fetch_score(trip_id)
        .await?
        .ok_or(ApiError::TripNotFound(trip_id))?;

    Ok(Json(score))
}
