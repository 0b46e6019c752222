//! Trip-level rollups: speed, distance, active driving time and utilization

use crate::config::ScoringConfig;
use trip_model::{TelemetrySample, WeatherSummary};

/// Aggregates over a trip's samples
#[derive(Debug, Clone, PartialEq)]
pub struct TripRollup {
    pub max_speed: f64,
    pub avg_speed: f64,
    pub total_distance: f64,
    /// Driving time, excluding parked gaps
    pub total_duration_hrs: f64,
    pub utilization_pct: f64,
    pub weather_summary: WeatherSummary,
}

impl TripRollup {
    /// Compute rollups. Returns `None` for an empty sequence.
    pub fn compute(samples: &[TelemetrySample], config: &ScoringConfig) -> Option<Self> {
        let (first, last) = (samples.first()?, samples.last()?);

        let max_speed = samples.iter().map(|s| s.speed_kmh).fold(0.0, f64::max);
        let total_distance = (last.odometer_km - first.odometer_km).max(0.0);
        let total_duration_hrs = active_duration_hrs(samples, config.max_active_gap_secs);

        let avg_speed = if total_duration_hrs > 0.0 {
            total_distance / total_duration_hrs
        } else {
            0.0
        };

        let span_hrs = last
            .time()
            .seconds_since(&first.time())
            .map(|secs| secs / 3600.0)
            .unwrap_or(config.min_rental_hours);
        let rental_hrs = span_hrs.max(config.min_rental_hours);
        let utilization_pct = (total_duration_hrs / rental_hrs * 100.0).min(100.0);

        Some(Self {
            max_speed,
            avg_speed,
            total_distance,
            total_duration_hrs,
            utilization_pct,
            weather_summary: samples.iter().map(|s| s.weather).collect(),
        })
    }
}

/// Sum of consecutive-sample gaps in `(0, max_gap_secs]`, in hours
fn active_duration_hrs(samples: &[TelemetrySample], max_gap_secs: f64) -> f64 {
    let times: Vec<_> = samples.iter().map(TelemetrySample::time).collect();

    let secs: f64 = times
        .windows(2)
        .filter_map(|pair| pair[1].seconds_since(&pair[0]))
        .filter(|&gap| gap > 0.0 && gap <= max_gap_secs)
        .sum();

    secs / 3600.0
}
