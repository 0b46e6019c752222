//! Event detection
//!
//! An event is a maximal run of consecutive samples for which a category's predicate
//! holds. Only the index of the run's first sample is kept.

use serde::{Deserialize, Serialize};
use tracing::debug;
use trip_model::TelemetrySample;

/// Threshold predicate over a single signal value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    Below(f64),
    Above(f64),
    AbsAbove(f64),
}

impl Predicate {
    pub fn holds(&self, value: f64) -> bool {
        match *self {
            Predicate::Below(t) => value < t,
            Predicate::Above(t) => value > t,
            Predicate::AbsAbove(t) => value.abs() > t,
        }
    }
}

/// Start indices of every maximal run where `predicate` holds
pub fn detect_runs<I>(values: I, predicate: Predicate) -> Vec<usize>
where
    I: IntoIterator<Item = f64>,
{
    let mut starts = Vec::new();
    let mut active = false;

    for (index, value) in values.into_iter().enumerate() {
        let hit = predicate.holds(value);
        if hit && !active {
            starts.push(index);
        }
        active = hit;
    }

    starts
}

/// Driving event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    HarshBraking,
    RapidAcceleration,
    HarshCornering,
    Speeding,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::HarshBraking,
        EventCategory::RapidAcceleration,
        EventCategory::HarshCornering,
        EventCategory::Speeding,
    ];

    /// Fixed detection threshold for the category
    pub fn predicate(&self) -> Predicate {
        match self {
            EventCategory::HarshBraking => Predicate::Below(-0.4),
            EventCategory::RapidAcceleration => Predicate::Above(0.4),
            EventCategory::HarshCornering => Predicate::AbsAbove(0.3),
            EventCategory::Speeding => Predicate::Above(80.0),
        }
    }

    /// Signal the predicate is evaluated on
    pub fn signal(&self, sample: &TelemetrySample) -> f64 {
        match self {
            EventCategory::HarshBraking | EventCategory::RapidAcceleration => sample.g_force_long,
            EventCategory::HarshCornering => sample.g_force_lat,
            EventCategory::Speeding => sample.speed_kmh,
        }
    }
}

/// A detected driving event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub category: EventCategory,
    pub start_index: usize,
}

/// Detects events of every category over a sample sequence
#[derive(Debug, Default, Clone, Copy)]
pub struct EventDetector;

impl EventDetector {
    pub fn new() -> Self {
        Self
    }

    /// Events of one category, in sample order
    pub fn detect_category(&self, samples: &[TelemetrySample], category: EventCategory) -> Vec<Event> {
        detect_runs(samples.iter().map(|s| category.signal(s)), category.predicate())
            .into_iter()
            .map(|start_index| Event { category, start_index })
            .collect()
    }

    /// Events of all categories, grouped by category then ordered by start index
    pub fn detect(&self, samples: &[TelemetrySample]) -> Vec<Event> {
        let events: Vec<Event> = EventCategory::ALL
            .iter()
            .flat_map(|&category| self.detect_category(samples, category))
            .collect();

        debug!("Detected {} events over {} samples", events.len(), samples.len());
        events
    }
}
