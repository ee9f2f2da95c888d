//! Error types for data parsing in snse-types.

use thiserror::Error;

/// Errors that can occur when parsing SNSE sample data.
///
/// Malformed numeric fields inside a sample are *not* reported through this
/// type: aggregation treats them as a zero contribution. These errors cover
/// structural problems, such as a device response that does not carry the
/// expected sensor values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Failed to parse data due to a structural problem.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A device response ran out of `$name$value` entries.
    #[error("Missing sensor {index}: response carries fewer than {expected} values")]
    MissingSensor { index: usize, expected: usize },

    /// The device answered with an error status instead of readings.
    #[error("Device reported an error: {0}")]
    DeviceError(String),
}

/// Result type alias using snse-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
