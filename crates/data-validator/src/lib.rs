//! Telemetry Data Validation
//!
//! Sanitation and range checking for telemetry submitted at the ingestion boundary.
//! Malformed numeric fields fall back to defaults instead of rejecting the trip.

mod error;
mod sanitizer;
mod validator;

pub use error::ValidationError;
pub use sanitizer::{SampleSanitizer, SanitizedSamples};
pub use validator::{ValidationConfig, ValidationResult, Validator};
