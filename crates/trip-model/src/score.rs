//! Scoring results

use crate::{Trip, Weather};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Sample counts per weather condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeatherSummary {
    pub counts: BTreeMap<Weather, u32>,
}

impl WeatherSummary {
    pub fn record(&mut self, weather: Weather) {
        *self.counts.entry(weather).or_insert(0) += 1;
    }

    /// Most frequent condition. Ties resolve to the first in declaration order.
    pub fn dominant(&self) -> Option<Weather> {
        self.counts
            .iter()
            .fold(None, |best: Option<(Weather, u32)>, (&weather, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((weather, count)),
            })
            .map(|(weather, _)| weather)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<Weather> for WeatherSummary {
    fn from_iter<I: IntoIterator<Item = Weather>>(iter: I) -> Self {
        let mut summary = WeatherSummary::default();
        for weather in iter {
            summary.record(weather);
        }
        summary
    }
}

/// Output of the scorer for one trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMetrics {
    pub safety_score: u32,
    pub harsh_braking_count: u32,
    pub rapid_accel_count: u32,
    pub harsh_cornering_count: u32,
    pub speeding_count: u32,
    /// Penalty points deducted from 100 (after aggregation policy)
    pub total_penalty: u32,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub total_distance: f64,
    pub total_duration_hrs: f64,
    pub utilization_pct: f64,
    pub weather_summary: WeatherSummary,
}

impl TripMetrics {
    /// Result for a trip with no samples
    pub fn neutral() -> Self {
        Self {
            safety_score: 100,
            harsh_braking_count: 0,
            rapid_accel_count: 0,
            harsh_cornering_count: 0,
            speeding_count: 0,
            total_penalty: 0,
            max_speed: 0.0,
            avg_speed: 0.0,
            total_distance: 0.0,
            total_duration_hrs: 0.0,
            utilization_pct: 0.0,
            weather_summary: WeatherSummary::default(),
        }
    }

    pub fn total_events(&self) -> u32 {
        self.harsh_braking_count + self.rapid_accel_count + self.harsh_cornering_count + self.speeding_count
    }
}

/// Persisted score record, unique per trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverScore {
    pub trip_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    #[serde(flatten)]
    pub metrics: TripMetrics,
    pub created_at: DateTime<Utc>,
}

impl DriverScore {
    pub fn for_trip(trip: &Trip, metrics: TripMetrics) -> Self {
        Self {
            trip_id: trip.id,
            vehicle_id: trip.vehicle_id,
            driver_id: trip.driver_id,
            metrics,
            created_at: Utc::now(),
        }
    }
}
