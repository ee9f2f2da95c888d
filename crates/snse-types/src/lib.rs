//! Sample line format and field codec for SNSE sensor logs.
//!
//! This crate holds the types shared by the log store and the query
//! service: the on-disk sample line, the per-device schema derived from a
//! log's first line, the sampling calibration, and the codec that splits
//! sensor fields from their graph labels.
//!
//! # Sample line format
//!
//! ```text
//! dd/mm/yyyy;hh:mm;field1;field2;...;fieldN;
//! ```
//!
//! Each field is a bare number (`81.75`) or a number with a graph marker
//! (`81.75:graph_Power (W)_Energy (Wh)`).
//!
//! # Example
//!
//! ```
//! use snse_types::{Calibration, DeviceSchema, Sample};
//!
//! let first = Sample::parse("01/06/2025;00:00;10:graph_P;");
//! let second = Sample::parse("01/06/2025;01:00;20:graph_P;");
//!
//! let schema = DeviceSchema::from_first_line(&first);
//! let calibration = Calibration::from_samples(&first, Some(&second));
//!
//! let sums: Vec<f64> = schema
//!     .values(&second)
//!     .into_iter()
//!     .map(|v| calibration.apply(v))
//!     .collect();
//! assert_eq!(schema.format_record("01/06/2025", &sums), "01/06/2025;20.000000:graph_P;");
//! ```

pub mod codec;
pub mod error;
pub mod features;
pub mod sample;

pub use error::{ParseError, ParseResult};
pub use sample::{Calibration, DeviceSchema, Sample, format_timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    // --- ParseError tests ---

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidData("test message".to_string());
        assert_eq!(err.to_string(), "Invalid data: test message");
    }

    #[test]
    fn test_missing_sensor_display() {
        let err = ParseError::MissingSensor {
            index: 2,
            expected: 3,
        };
        assert_eq!(
            err.to_string(),
            "Missing sensor 2: response carries fewer than 3 values"
        );
    }

    #[test]
    fn test_parse_error_debug() {
        let err = ParseError::DeviceError("404 Not Found".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("DeviceError"));
        assert!(debug_str.contains("404 Not Found"));
    }

    // --- Serialization tests ---

    #[test]
    fn test_schema_serialization() {
        let schema = DeviceSchema::from_first_line(&Sample::parse("d;t;1:graph_P;2;"));
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"{"labels":["graph_P",null]}"#);
    }

    #[test]
    fn test_calibration_serialization() {
        assert_eq!(serde_json::to_string(&Calibration::UNIT).unwrap(), "1.0");
    }
}
