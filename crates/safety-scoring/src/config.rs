//! Scoring configuration

use serde::{Deserialize, Serialize};

/// Lowest safety score a trip can receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFloor {
    /// Scores range over 0-100
    #[default]
    Zero,
    /// Scores are clamped to 40-100, keeping aggressive drivers in a 40-60 band
    Banded,
}

impl ScoreFloor {
    pub fn points(&self) -> u32 {
        match self {
            ScoreFloor::Zero => 0,
            ScoreFloor::Banded => 40,
        }
    }
}

/// How per-event penalties combine into the trip penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyAggregation {
    /// Sum of all event penalties
    #[default]
    Sum,
    /// Half the sum, truncated
    HalfSum,
}

impl PenaltyAggregation {
    pub fn apply(&self, sum: u32) -> u32 {
        match self {
            PenaltyAggregation::Sum => sum,
            PenaltyAggregation::HalfSum => (sum as f64 * 0.5) as u32,
        }
    }
}

/// Scoring configuration.
///
/// Detection thresholds are fixed by [`EventCategory`](crate::EventCategory) and are not part
/// of this structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Penalty points per event before multipliers
    pub base_penalty: f64,
    /// Multiplier when the event's first sample reports rain
    pub rain_multiplier: f64,
    /// Multiplier when the event's first sample falls at night
    pub night_multiplier: f64,
    /// Night starts at this hour (inclusive)
    pub night_start_hour: u32,
    /// Night ends at this hour (exclusive)
    pub night_end_hour: u32,
    pub floor: ScoreFloor,
    pub aggregation: PenaltyAggregation,
    /// Gaps longer than this count as parked time (seconds)
    pub max_active_gap_secs: f64,
    /// Minimum rental window for utilization (hours)
    pub min_rental_hours: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_penalty: 2.0,
            rain_multiplier: 2.0,
            night_multiplier: 1.5,
            night_start_hour: 20,
            night_end_hour: 6,
            floor: ScoreFloor::Zero,
            aggregation: PenaltyAggregation::Sum,
            max_active_gap_secs: 300.0,
            min_rental_hours: 48.0,
        }
    }
}

impl ScoringConfig {
    /// Default config with the 40-point floor
    pub fn banded() -> Self {
        Self {
            floor: ScoreFloor::Banded,
            ..Default::default()
        }
    }

    /// Whether an hour of day falls inside the night window
    pub fn is_night_hour(&self, hour: u32) -> bool {
        if self.night_start_hour <= self.night_end_hour {
            hour >= self.night_start_hour && hour < self.night_end_hour
        } else {
            hour >= self.night_start_hour || hour < self.night_end_hour
        }
    }
}
