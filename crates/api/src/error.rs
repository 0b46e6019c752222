//! API errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use data_validator::ValidationError;
use serde_json::json;
use storage::StorageError;
use thiserror::Error;
use tracing::error;
use trip_model::TripStatus;
use trip_worker::WorkerError;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid trip id: {0}")]
    InvalidTripId(String),

    #[error("Trip {0} not found")]
    TripNotFound(Uuid),

    #[error("Telemetry rejected: {} invalid values", .0.len())]
    InvalidTelemetry(Vec<ValidationError>),

    #[error("Score for trip {trip_id} not available (status {status})")]
    ScoreNotReady { trip_id: Uuid, status: TripStatus },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue unavailable: {0}")]
    Queue(#[from] WorkerError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidTripId(_) => StatusCode::BAD_REQUEST,
            ApiError::TripNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidTelemetry(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ScoreNotReady {
                status: TripStatus::Failed,
                ..
            } => StatusCode::CONFLICT,
            ApiError::ScoreNotReady { .. } => StatusCode::ACCEPTED,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = match &self {
            ApiError::InvalidTelemetry(errors) => json!({
                "error": self.to_string(),
                "details": errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            }),
            ApiError::ScoreNotReady { trip_id, status } => json!({
                "error": "Score not available",
                "trip_id": trip_id,
                "status": status,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::TripNotFound(id).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::ScoreNotReady {
                trip_id: id,
                status: TripStatus::Processing
            }
            .status_code(),
            StatusCode::ACCEPTED
        );
        assert_eq!(
            ApiError::ScoreNotReady {
                trip_id: id,
                status: TripStatus::Failed
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Queue(WorkerError::QueueClosed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
