//! Trip Domain Model
//!
//! Shared types for trip ingestion, scoring and persistence:
//! - Telemetry samples and their typed timestamps
//! - Trips and the trip status lifecycle
//! - Per-trip scoring metrics and the persisted driver score

mod sample;
mod score;
mod status;
mod trip;

pub use sample::{SampleTime, TelemetrySample, Weather};
pub use score::{DriverScore, TripMetrics, WeatherSummary};
pub use status::TripStatus;
pub use trip::Trip;

use thiserror::Error;

/// Domain model errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("Unknown trip status: {0}")]
    UnknownStatus(String),
}
