//! Trip scorer

use crate::config::ScoringConfig;
use crate::detector::{EventCategory, EventDetector};
use crate::penalty::PenaltyModel;
use crate::rollup::TripRollup;
use crate::ScoringError;
use tracing::debug;
use trip_model::{TelemetrySample, TripMetrics};

/// Produces trip metrics from a sample sequence
pub trait Analyzer: Send + Sync {
    fn analyze(&self, samples: &[TelemetrySample]) -> Result<TripMetrics, ScoringError>;
}

/// Default scorer: event detection, contextual penalties and rollups
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
    detector: EventDetector,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            detector: EventDetector::new(),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, samples: &[TelemetrySample]) -> Result<TripMetrics, ScoringError> {
        if samples.is_empty() {
            debug!("No samples, returning neutral score");
            return Ok(TripMetrics::neutral());
        }

        check_finite(samples)?;

        let events = self.detector.detect(samples);
        let breakdown = PenaltyModel::new(&self.config).assess(&events, samples)?;

        let total_penalty = self.config.aggregation.apply(breakdown.total);
        let safety_score = 100u32
            .saturating_sub(total_penalty)
            .max(self.config.floor.points());

        let rollup = TripRollup::compute(samples, &self.config)
            .ok_or_else(|| ScoringError::Analysis("no samples to roll up".to_string()))?;

        for (name, value) in [
            ("avg_speed", rollup.avg_speed),
            ("utilization_pct", rollup.utilization_pct),
        ] {
            if !value.is_finite() {
                return Err(ScoringError::NonFiniteResult(name));
            }
        }

        debug!(
            "Scored {} samples: {} events, penalty {}, score {}",
            samples.len(),
            events.len(),
            total_penalty,
            safety_score
        );

        Ok(TripMetrics {
            safety_score,
            harsh_braking_count: breakdown.count(EventCategory::HarshBraking),
            rapid_accel_count: breakdown.count(EventCategory::RapidAcceleration),
            harsh_cornering_count: breakdown.count(EventCategory::HarshCornering),
            speeding_count: breakdown.count(EventCategory::Speeding),
            total_penalty,
            max_speed: rollup.max_speed,
            avg_speed: rollup.avg_speed,
            total_distance: rollup.total_distance,
            total_duration_hrs: rollup.total_duration_hrs,
            utilization_pct: rollup.utilization_pct,
            weather_summary: rollup.weather_summary,
        })
    }
}

impl Analyzer for Scorer {
    fn analyze(&self, samples: &[TelemetrySample]) -> Result<TripMetrics, ScoringError> {
        self.score(samples)
    }
}

fn check_finite(samples: &[TelemetrySample]) -> Result<(), ScoringError> {
    for (index, s) in samples.iter().enumerate() {
        let fields = [
            ("speed_kmh", s.speed_kmh),
            ("g_force_long", s.g_force_long),
            ("g_force_lat", s.g_force_lat),
            ("odometer_km", s.odometer_km),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ScoringError::NonFiniteInput { index, field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PenaltyAggregation, ScoreFloor};
    use proptest::prelude::*;
    use trip_model::Weather;

    fn daytime(g_long: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp: Some("2024-06-01T12:00:00".into()),
            speed_kmh: 50.0,
            g_force_long: g_long,
            ..Default::default()
        }
    }

    #[test]
    fn test_braking_and_acceleration_scenario() {
        let samples: Vec<_> = [0.1, -0.5, 0.1, 0.6].into_iter().map(daytime).collect();
        let metrics = Scorer::default().score(&samples).unwrap();

        assert_eq!(metrics.harsh_braking_count, 1);
        assert_eq!(metrics.rapid_accel_count, 1);
        assert_eq!(metrics.harsh_cornering_count, 0);
        assert_eq!(metrics.speeding_count, 0);
        assert_eq!(metrics.total_penalty, 4);
        assert_eq!(metrics.safety_score, 96);
    }

    #[test]
    fn test_empty_is_neutral() {
        let metrics = Scorer::default().score(&[]).unwrap();
        assert_eq!(metrics, TripMetrics::neutral());
        assert_eq!(metrics.safety_score, 100);
    }

    #[test]
    fn test_calm_trip_scores_100() {
        let samples = vec![daytime(0.1); 20];
        let metrics = Scorer::default().score(&samples).unwrap();
        assert_eq!(metrics.safety_score, 100);
        assert_eq!(metrics.total_events(), 0);
        assert_eq!(metrics.max_speed, 50.0);
    }

    #[test]
    fn test_rainy_night_event() {
        let samples = vec![TelemetrySample {
            timestamp: Some("2024-06-01T21:00:00".into()),
            weather: Weather::Rainy,
            g_force_lat: 0.5,
            ..Default::default()
        }];
        let metrics = Scorer::default().score(&samples).unwrap();
        assert_eq!(metrics.harsh_cornering_count, 1);
        assert_eq!(metrics.safety_score, 94);
    }

    #[test]
    fn test_score_floor_policies() {
        // 60 separate braking events = 120 penalty points
        let samples: Vec<_> = (0..120)
            .map(|i| daytime(if i % 2 == 0 { -0.8 } else { 0.0 }))
            .collect();

        let standard = Scorer::default().score(&samples).unwrap();
        assert_eq!(standard.harsh_braking_count, 60);
        assert_eq!(standard.safety_score, 0);

        let banded = Scorer::new(ScoringConfig::banded()).score(&samples).unwrap();
        assert_eq!(banded.safety_score, 40);
    }

    #[test]
    fn test_half_sum_aggregation() {
        let samples: Vec<_> = [0.1, -0.5, 0.1, 0.6, 0.1, 0.6].into_iter().map(daytime).collect();
        let config = ScoringConfig {
            aggregation: PenaltyAggregation::HalfSum,
            ..Default::default()
        };
        let metrics = Scorer::new(config).score(&samples).unwrap();
        assert_eq!(metrics.total_penalty, 3);
        assert_eq!(metrics.safety_score, 97);
    }

    #[test]
    fn test_non_finite_input_fails() {
        let samples = vec![daytime(0.0), daytime(f64::NAN)];
        let err = Scorer::default().score(&samples).unwrap_err();
        assert_eq!(
            err,
            ScoringError::NonFiniteInput {
                index: 1,
                field: "g_force_long"
            }
        );
    }

    fn any_sample() -> impl Strategy<Value = TelemetrySample> {
        (-1.0f64..1.0, -1.0f64..1.0, 0.0f64..150.0, any::<bool>(), 0u32..24).prop_map(
            |(g_long, g_lat, speed, rainy, hour)| TelemetrySample {
                timestamp: Some(format!("2024-06-01T{hour:02}:00:00")),
                speed_kmh: speed,
                g_force_long: g_long,
                g_force_lat: g_lat,
                weather: if rainy { Weather::Rainy } else { Weather::Clear },
                ..Default::default()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_score_bounded(
            samples in prop::collection::vec(any_sample(), 0..100),
            banded in any::<bool>(),
        ) {
            let config = if banded { ScoringConfig::banded() } else { ScoringConfig::default() };
            let floor = config.floor.points();
            let metrics = Scorer::new(config).score(&samples).unwrap();
            prop_assert!(metrics.safety_score <= 100);
            prop_assert!(metrics.safety_score >= floor);
        }

        #[test]
        fn prop_adding_events_never_raises_score(
            samples in prop::collection::vec(any_sample(), 0..60),
            extra in prop::collection::vec(any_sample(), 1..20),
            floor in prop_oneof![Just(ScoreFloor::Zero), Just(ScoreFloor::Banded)],
        ) {
            let scorer = Scorer::new(ScoringConfig { floor, ..Default::default() });
            let before = scorer.score(&samples).unwrap();

            // A calm separator keeps the appended runs distinct from the original tail
            let mut extended = samples.clone();
            extended.push(TelemetrySample::default());
            extended.extend(extra);
            let after = scorer.score(&extended).unwrap();

            prop_assert!(after.total_events() >= before.total_events());
            prop_assert!(after.safety_score <= before.safety_score);
        }

        #[test]
        fn prop_no_crossings_scores_100(
            values in prop::collection::vec((-0.4f64..=0.4, -0.3f64..=0.3, 0.0f64..=80.0), 0..100),
        ) {
            let samples: Vec<_> = values
                .into_iter()
                .map(|(g_long, g_lat, speed)| TelemetrySample {
                    g_force_long: g_long,
                    g_force_lat: g_lat,
                    speed_kmh: speed,
                    ..Default::default()
                })
                .collect();
            let metrics = Scorer::default().score(&samples).unwrap();
            prop_assert_eq!(metrics.safety_score, 100);
            prop_assert_eq!(metrics.total_events(), 0);
        }
    }
}
