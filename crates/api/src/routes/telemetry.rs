//! Telemetry Ingestion Route
//!
//! Claim check: the full sample set is persisted, only the trip id is queued.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use trip_model::SampleTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Submitted trip
#[derive(Debug, Deserialize)]
pub struct TelemetryPayload {
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    /// Trip start; defaults to the time of submission
    pub timestamp: Option<String>,
    /// Raw samples, sanitised before storage
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Response for an accepted trip
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub trip_id: Uuid,
}

/// Accept a trip for analysis
pub async fn ingest_telemetry(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TelemetryPayload>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let sanitized = state.sanitizer.sanitize(&payload.data);

    let result = state.validator.validate_samples(&sanitized.samples);
    if !result.valid {
        info!(
            "Rejected telemetry for vehicle {}: {} invalid values",
            payload.vehicle_id,
            result.errors.len()
        );
        return Err(ApiError::InvalidTelemetry(result.errors));
    }

    let start_time = SampleTime::parse(payload.timestamp.as_deref())
        .utc()
        .unwrap_or_else(Utc::now);

    let trip = state
        .trips
        .initialize_trip(payload.vehicle_id, payload.driver_id, start_time, sanitized.samples)
        .await?;

    if let Err(e) = state.queue.publish(trip.id).await {
        error!("Trip {} stored but could not be queued: {}", trip.id, e);
        return Err(e.into());
    }

    metrics::counter!("fleetflow_trips_ingested_total").increment(1);
    info!("Trip {} queued for analysis", trip.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "QUEUED_FOR_ANALYSIS".to_string(),
            trip_id: trip.id,
        }),
    ))
}
