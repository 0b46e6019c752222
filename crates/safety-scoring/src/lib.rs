//! Trip Safety Scoring
//!
//! Pure, synchronous scoring of a trip's telemetry:
//! - Event detection (maximal runs over a threshold predicate)
//! - Contextual penalties (weather and time of day at the run's first sample)
//! - Aggregation into a bounded safety score with trip rollups

pub mod config;
pub mod detector;
pub mod penalty;
pub mod rollup;
pub mod scorer;

pub use config::{PenaltyAggregation, ScoreFloor, ScoringConfig};
pub use detector::{detect_runs, Event, EventCategory, EventDetector, Predicate};
pub use penalty::{PenaltyBreakdown, PenaltyModel};
pub use rollup::TripRollup;
pub use scorer::{Analyzer, Scorer};

use thiserror::Error;

/// Scoring error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Sample {index}: {field} is not a finite number")]
    NonFiniteInput { index: usize, field: &'static str },

    #[error("Event start index {index} outside of {len} samples")]
    EventOutOfBounds { index: usize, len: usize },

    #[error("Computed {0} is not a finite number")]
    NonFiniteResult(&'static str),

    #[error("Analysis failed: {0}")]
    Analysis(String),
}
