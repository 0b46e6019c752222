//! Validation Error Types

use thiserror::Error;

/// Errors during sample validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("sample {index}: {field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Numeric field is not a finite number
    #[error("sample {index}: {field} is not a finite number")]
    NonFinite { index: usize, field: &'static str },

    /// Required field missing or of the wrong type; replaced with its default
    #[error("sample {index}: {field} missing or malformed, defaulted")]
    MalformedField { index: usize, field: &'static str },

    /// Sample is not a JSON object; replaced with an all-default sample
    #[error("sample {index}: expected an object")]
    InvalidFormat { index: usize },
}
