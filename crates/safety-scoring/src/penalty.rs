//! Contextual penalty model
//!
//! Each event is charged `base × weather × time`, truncated to whole points. Context is
//! read from the event's first sample only; later samples in the run are ignored.

use crate::config::ScoringConfig;
use crate::detector::{Event, EventCategory};
use crate::ScoringError;
use std::collections::BTreeMap;
use trip_model::{SampleTime, TelemetrySample};

/// Penalty points per category and in total, before aggregation policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PenaltyBreakdown {
    pub per_category: BTreeMap<EventCategory, u32>,
    pub event_counts: BTreeMap<EventCategory, u32>,
    pub total: u32,
}

impl PenaltyBreakdown {
    pub fn count(&self, category: EventCategory) -> u32 {
        self.event_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn points(&self, category: EventCategory) -> u32 {
        self.per_category.get(&category).copied().unwrap_or(0)
    }
}

/// Maps events to penalty points
pub struct PenaltyModel<'a> {
    config: &'a ScoringConfig,
}

impl<'a> PenaltyModel<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn weather_multiplier(&self, sample: &TelemetrySample) -> f64 {
        if sample.is_rainy() {
            self.config.rain_multiplier
        } else {
            1.0
        }
    }

    /// Unknown timestamps are never treated as night
    pub fn time_multiplier(&self, time: SampleTime) -> f64 {
        match time.hour() {
            Some(hour) if self.config.is_night_hour(hour) => self.config.night_multiplier,
            _ => 1.0,
        }
    }

    /// Penalty for one event, looked up at its start sample
    pub fn penalty(&self, event: &Event, samples: &[TelemetrySample]) -> Result<u32, ScoringError> {
        let sample = samples.get(event.start_index).ok_or(ScoringError::EventOutOfBounds {
            index: event.start_index,
            len: samples.len(),
        })?;

        let raw = self.config.base_penalty
            * self.weather_multiplier(sample)
            * self.time_multiplier(sample.time());

        if !raw.is_finite() {
            return Err(ScoringError::NonFiniteResult("penalty"));
        }
        Ok(raw.max(0.0) as u32)
    }

    /// Sum penalties per category and overall
    pub fn assess(&self, events: &[Event], samples: &[TelemetrySample]) -> Result<PenaltyBreakdown, ScoringError> {
        let mut breakdown = PenaltyBreakdown::default();

        for event in events {
            let points = self.penalty(event, samples)?;
            *breakdown.per_category.entry(event.category).or_insert(0) += points;
            *breakdown.event_counts.entry(event.category).or_insert(0) += 1;
            breakdown.total += points;
        }

        Ok(breakdown)
    }
}
