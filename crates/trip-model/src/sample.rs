//! Telemetry samples

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition reported with a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Cloudy,
    Rainy,
    Snowy,
    Foggy,
    #[serde(other)]
    Unknown,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Cloudy => "cloudy",
            Weather::Rainy => "rainy",
            Weather::Snowy => "snowy",
            Weather::Foggy => "foggy",
            Weather::Unknown => "unknown",
        }
    }
}

/// Wall-clock time of a sample.
///
/// The local reading (offset kept as written, never converted) drives time-of-day
/// rules. When the timestamp carries an offset the absolute instant is kept too, and
/// elapsed time is measured between instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTime {
    At {
        local: NaiveDateTime,
        instant: Option<DateTime<FixedOffset>>,
    },
    /// Missing or unparseable timestamp
    Unknown,
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl SampleTime {
    /// Parse a raw timestamp, falling back to [`SampleTime::Unknown`]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return SampleTime::Unknown;
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return SampleTime::At {
                local: dt.naive_local(),
                instant: Some(dt),
            };
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map_or(SampleTime::Unknown, |local| SampleTime::At { local, instant: None })
    }

    /// Hour of day (0-23) as written, if known
    pub fn hour(&self) -> Option<u32> {
        self.naive().map(|dt| dt.hour())
    }

    pub fn naive(&self) -> Option<NaiveDateTime> {
        match self {
            SampleTime::At { local, .. } => Some(*local),
            SampleTime::Unknown => None,
        }
    }

    /// Absolute time; a timestamp without offset is taken as UTC
    pub fn utc(&self) -> Option<DateTime<Utc>> {
        match self {
            SampleTime::At {
                instant: Some(dt), ..
            } => Some(dt.with_timezone(&Utc)),
            SampleTime::At { local, instant: None } => Some(local.and_utc()),
            SampleTime::Unknown => None,
        }
    }

    /// Seconds elapsed from `earlier` to `self`. `None` when either side is unknown.
    ///
    /// Instants are compared when both sides carry an offset; otherwise the local
    /// readings are.
    pub fn seconds_since(&self, earlier: &SampleTime) -> Option<f64> {
        let delta = match (self, earlier) {
            (
                SampleTime::At {
                    instant: Some(later), ..
                },
                SampleTime::At {
                    instant: Some(earlier),
                    ..
                },
            ) => later.signed_duration_since(*earlier),
            _ => self.naive()?.signed_duration_since(earlier.naive()?),
        };
        Some(delta.num_milliseconds() as f64 / 1000.0)
    }
}

/// A single telemetry sample within a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Position within the trip (insertion order)
    #[serde(default)]
    pub sequence_index: u32,
    /// Raw timestamp as submitted
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub speed_kmh: f64,
    /// Longitudinal g-force (negative = braking)
    #[serde(default)]
    pub g_force_long: f64,
    /// Lateral g-force
    #[serde(default)]
    pub g_force_lat: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub odometer_km: f64,
}

impl TelemetrySample {
    pub fn time(&self) -> SampleTime {
        SampleTime::parse(self.timestamp.as_deref())
    }

    pub fn is_rainy(&self) -> bool {
        self.weather == Weather::Rainy
    }
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            sequence_index: 0,
            timestamp: None,
            speed_kmh: 0.0,
            g_force_long: 0.0,
            g_force_lat: 0.0,
            latitude: None,
            longitude: None,
            weather: Weather::Clear,
            odometer_km: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let sample: TelemetrySample = serde_json::from_str(r#"{"speed_kmh": 42.0}"#).unwrap();
        assert_eq!(sample.speed_kmh, 42.0);
        assert_eq!(sample.g_force_long, 0.0);
        assert_eq!(sample.g_force_lat, 0.0);
        assert_eq!(sample.weather, Weather::Clear);
        assert_eq!(sample.time(), SampleTime::Unknown);
    }

    #[test]
    fn test_unrecognised_weather() {
        let sample: TelemetrySample = serde_json::from_str(r#"{"weather": "hail"}"#).unwrap();
        assert_eq!(sample.weather, Weather::Unknown);

        let sample: TelemetrySample = serde_json::from_str(r#"{"weather": "rainy"}"#).unwrap();
        assert!(sample.is_rainy());
    }

    #[test]
    fn test_parse_keeps_offset_local_hour() {
        let time = SampleTime::parse(Some("2024-03-01T22:15:00+05:00"));
        assert_eq!(time.hour(), Some(22));

        let time = SampleTime::parse(Some("2024-03-01T05:59:59Z"));
        assert_eq!(time.hour(), Some(5));
    }

    #[test]
    fn test_parse_naive_formats() {
        assert_eq!(SampleTime::parse(Some("2024-03-01T13:00:00")).hour(), Some(13));
        assert_eq!(SampleTime::parse(Some("2024-03-01 07:30:00.250")).hour(), Some(7));
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(SampleTime::parse(Some("yesterday")), SampleTime::Unknown);
        assert_eq!(SampleTime::parse(Some("")), SampleTime::Unknown);
        assert_eq!(SampleTime::parse(None), SampleTime::Unknown);
    }

    #[test]
    fn test_seconds_since() {
        let a = SampleTime::parse(Some("2024-03-01T10:00:00"));
        let b = SampleTime::parse(Some("2024-03-01T10:01:30"));
        assert_eq!(b.seconds_since(&a), Some(90.0));
        assert_eq!(a.seconds_since(&b), Some(-90.0));
        assert_eq!(b.seconds_since(&SampleTime::Unknown), None);
    }

    #[test]
    fn test_seconds_since_respects_offsets() {
        let a = SampleTime::parse(Some("2024-03-01T10:00:00+00:00"));
        let b = SampleTime::parse(Some("2024-03-01T10:30:00+01:00"));
        assert_eq!(b.seconds_since(&a), Some(-1800.0));

        // Same instant written in two zones
        let c = SampleTime::parse(Some("2024-03-01T11:00:00+01:00"));
        assert_eq!(c.seconds_since(&a), Some(0.0));
        assert_eq!(c.hour(), Some(11));
    }

    #[test]
    fn test_utc_conversion() {
        let offset = SampleTime::parse(Some("2024-03-01T22:15:00+05:00"));
        assert_eq!(offset.utc().unwrap().to_rfc3339(), "2024-03-01T17:15:00+00:00");

        let naive = SampleTime::parse(Some("2024-03-01T22:15:00"));
        assert_eq!(naive.utc().unwrap().to_rfc3339(), "2024-03-01T22:15:00+00:00");
        assert_eq!(SampleTime::Unknown.utc(), None);
    }
}
