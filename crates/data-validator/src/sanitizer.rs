//! Sample sanitation
//!
//! Converts loosely-typed JSON samples into [`TelemetrySample`]s. Fields that are
//! missing, null or of the wrong type take their defaults and are reported.

use crate::error::ValidationError;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use trip_model::{TelemetrySample, Weather};

/// Fields every sample is expected to carry
const REQUIRED_FIELDS: [&str; 3] = ["speed_kmh", "g_force_long", "g_force_lat"];

/// Samples after sanitation, plus the list of defaulted fields
#[derive(Debug, Clone, Default)]
pub struct SanitizedSamples {
    pub samples: Vec<TelemetrySample>,
    pub defaulted: Vec<ValidationError>,
}

impl SanitizedSamples {
    pub fn is_clean(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Turns raw JSON samples into typed samples, in submission order
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleSanitizer;

impl SampleSanitizer {
    pub fn new() -> Self {
        Self
    }

    pub fn sanitize(&self, raw: &[Value]) -> SanitizedSamples {
        let mut out = SanitizedSamples {
            samples: Vec::with_capacity(raw.len()),
            defaulted: Vec::new(),
        };

        for (index, value) in raw.iter().enumerate() {
            let sample = match value.as_object() {
                Some(fields) => self.sanitize_object(index, fields, &mut out.defaulted),
                None => {
                    out.defaulted.push(ValidationError::InvalidFormat { index });
                    TelemetrySample::default()
                }
            };
            out.samples.push(TelemetrySample {
                sequence_index: index as u32,
                ..sample
            });
        }

        if !out.is_clean() {
            warn!(
                "Sanitized {} samples, {} fields defaulted",
                out.samples.len(),
                out.defaulted.len()
            );
        } else {
            debug!("Sanitized {} samples", out.samples.len());
        }

        out
    }

    fn sanitize_object(
        &self,
        index: usize,
        fields: &Map<String, Value>,
        defaulted: &mut Vec<ValidationError>,
    ) -> TelemetrySample {
        let mut required = |field: &'static str| match fields.get(field).and_then(number) {
            Some(v) => v,
            None => {
                defaulted.push(ValidationError::MalformedField { index, field });
                0.0
            }
        };

        let speed_kmh = required(REQUIRED_FIELDS[0]);
        let g_force_long = required(REQUIRED_FIELDS[1]);
        let g_force_lat = required(REQUIRED_FIELDS[2]);

        let weather = fields
            .get("weather")
            .and_then(|w| w.as_str())
            .map(parse_weather)
            .unwrap_or_default();

        TelemetrySample {
            sequence_index: index as u32,
            timestamp: fields.get("timestamp").and_then(|t| t.as_str()).map(str::to_owned),
            speed_kmh,
            g_force_long,
            g_force_lat,
            latitude: fields.get("latitude").and_then(number),
            longitude: fields.get("longitude").and_then(number),
            weather,
            odometer_km: fields.get("odometer_km").and_then(number).unwrap_or(0.0),
        }
    }
}

/// Numbers, and numeric strings, as f64
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_weather(raw: &str) -> Weather {
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).unwrap_or(Weather::Unknown)
}
