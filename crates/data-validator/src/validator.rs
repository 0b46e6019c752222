//! Range Checking for Telemetry Samples

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use trip_model::TelemetrySample;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Speed valid range (km/h)
    pub speed_range: (f64, f64),
    /// Longitudinal and lateral g-force valid range
    pub g_force_range: (f64, f64),
    pub latitude_range: (f64, f64),
    pub longitude_range: (f64, f64),
    /// Odometer valid range (km)
    pub odometer_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            speed_range: (0.0, 400.0),
            g_force_range: (-5.0, 5.0),
            latitude_range: (-90.0, 90.0),
            longitude_range: (-180.0, 180.0),
            odometer_range: (0.0, 5_000_000.0),
        }
    }
}

/// Result of validating a sample sequence
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all values are valid
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub samples_checked: usize,
}

impl ValidationResult {
    pub fn valid(samples_checked: usize) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            samples_checked,
        }
    }

    pub fn invalid(errors: Vec<ValidationError>, samples_checked: usize) -> Self {
        Self {
            valid: false,
            errors,
            samples_checked,
        }
    }
}

/// Range validator for telemetry samples
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        index: usize,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { index, field });
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                index,
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Check every numeric field of one sample, collecting all violations
    pub fn validate_sample(&self, index: usize, sample: &TelemetrySample) -> Vec<ValidationError> {
        let cfg = &self.config;
        let mut checks = vec![
            self.validate_range(index, "speed_kmh", sample.speed_kmh, cfg.speed_range),
            self.validate_range(index, "g_force_long", sample.g_force_long, cfg.g_force_range),
            self.validate_range(index, "g_force_lat", sample.g_force_lat, cfg.g_force_range),
            self.validate_range(index, "odometer_km", sample.odometer_km, cfg.odometer_range),
        ];
        if let Some(lat) = sample.latitude {
            checks.push(self.validate_range(index, "latitude", lat, cfg.latitude_range));
        }
        if let Some(lon) = sample.longitude {
            checks.push(self.validate_range(index, "longitude", lon, cfg.longitude_range));
        }

        checks.into_iter().filter_map(Result::err).collect()
    }

    pub fn validate_samples(&self, samples: &[TelemetrySample]) -> ValidationResult {
        let errors: Vec<_> = samples
            .iter()
            .enumerate()
            .flat_map(|(index, sample)| self.validate_sample(index, sample))
            .collect();

        if errors.is_empty() {
            ValidationResult::valid(samples.len())
        } else {
            ValidationResult::invalid(errors, samples.len())
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
