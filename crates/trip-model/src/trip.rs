//! Trip record

use crate::{TelemetrySample, TripStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A submitted trip with its full sample sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Samples ordered by `sequence_index`
    pub samples: Vec<TelemetrySample>,
    pub status: TripStatus,
}

impl Trip {
    /// Create a new trip in `PENDING_ANALYSIS`.
    ///
    /// Samples are renumbered in the order given.
    pub fn new(
        vehicle_id: Uuid,
        driver_id: Uuid,
        start_time: DateTime<Utc>,
        mut samples: Vec<TelemetrySample>,
    ) -> Self {
        for (index, sample) in samples.iter_mut().enumerate() {
            sample.sequence_index = index as u32;
        }

        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            driver_id,
            start_time,
            end_time: None,
            samples,
            status: TripStatus::PendingAnalysis,
        }
    }

    /// Time of the last sample with a readable timestamp, in UTC
    pub fn last_sample_time(&self) -> Option<DateTime<Utc>> {
        self.samples.iter().rev().find_map(|s| s.time().utc())
    }
}
