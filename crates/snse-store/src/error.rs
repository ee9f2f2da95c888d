//! Error types for snse-store.

use std::path::PathBuf;

/// Result type for snse-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in snse-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device has no log, or its log holds no lines.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The log exists but no line matches the requested selector.
    #[error("No data for {selector} on device {device}")]
    NoMatch { device: String, selector: String },

    /// The log's first line carries no sensor fields.
    #[error("Device {0} has no sensor fields")]
    NoSensors(String),

    /// Device id that cannot be mapped to a file under the store root.
    #[error("Invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// Sample line that would break the one-line-per-sample layout.
    #[error("Invalid sample line: {0:?}")]
    InvalidSample(String),

    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means "there is nothing to report" rather than a
    /// failure of the store itself.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NoMatch { .. } | Error::NoSensors(_)
        )
    }
}
