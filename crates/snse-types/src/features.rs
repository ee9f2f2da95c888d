//! Parsing of device feature responses.
//!
//! Devices answer `GET ?features` with a framed text body in which every
//! sensor appears as `$name$value;`. The value may carry a graph marker
//! (`$Power$81.75:graph_Power (W)_Energy (Wh);`) which is kept verbatim so it
//! lands in the device log unchanged.

use crate::error::{ParseError, ParseResult};

/// Request sent to a device to read its current sensor values.
pub const FEATURES_REQUEST: &str = "GET ?features";

const VALUE_MARKER: char = '$';

/// Status lines that mark a response as an error rather than readings.
const ERROR_STATUSES: [&str; 2] = ["500 Internal server error", "404 Not Found"];

/// Extract the first `count` sensor values from a feature response.
///
/// # Examples
///
/// ```
/// use snse_types::features::extract_sensor_values;
///
/// let raw = "200 OK\n$Switch$1;$Battery$3.7:graph_V;\r\n";
/// let values = extract_sensor_values(raw, 2).unwrap();
/// assert_eq!(values, vec!["1", "3.7:graph_V"]);
/// ```
///
/// # Errors
///
/// Returns [`ParseError::DeviceError`] when the device answered with an error
/// status, and [`ParseError::MissingSensor`] when fewer than `count` values
/// are present.
pub fn extract_sensor_values(raw: &str, count: usize) -> ParseResult<Vec<String>> {
    if let Some(status) = ERROR_STATUSES.iter().find(|status| raw.contains(**status)) {
        return Err(ParseError::DeviceError((*status).to_string()));
    }

    let mut values = Vec::with_capacity(count);
    let mut rest = raw;
    for index in 0..count {
        let missing = || ParseError::MissingSensor {
            index,
            expected: count,
        };
        // Skip `$name` and land right after the second marker.
        let (_, after_first) = rest.split_once(VALUE_MARKER).ok_or_else(missing)?;
        let (_, after_second) = after_first.split_once(VALUE_MARKER).ok_or_else(missing)?;

        let (value, remainder) = match after_second.split_once(';') {
            Some((value, remainder)) => (value, remainder),
            None => (after_second, ""),
        };
        values.push(value.trim_end_matches(['\r', '\n']).to_string());
        rest = remainder;
    }

    Ok(values)
}
