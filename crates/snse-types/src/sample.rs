//! Sample lines, device schemas and calibration.
//!
//! A sample line has the shape `dd/mm/yyyy;hh:mm;field1;...;fieldN;`. The
//! first line of a device log fixes the [`DeviceSchema`] (sensor count and
//! labels) and the first two lines fix the [`Calibration`].

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, Time};

use crate::codec::{self, FIELD_SEPARATOR};

/// One line of a device log.
///
/// Parsing is infallible: accessors return `None` or an empty sensor portion
/// when the line is shorter than expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    raw: String,
}

impl Sample {
    /// Wrap a raw log line, dropping a trailing `\r` or `\n`.
    pub fn parse(line: &str) -> Self {
        Self {
            raw: line.trim_end_matches(['\r', '\n']).to_string(),
        }
    }

    /// Build a sample line from a timestamp and raw sensor fields.
    ///
    /// The result is terminated by `;`, the format written by the collector.
    ///
    /// ```
    /// use snse_types::Sample;
    /// use time::macros::datetime;
    ///
    /// let sample = Sample::from_fields(datetime!(2025-06-01 13:05 UTC), &["10:graph_P", "3"]);
    /// assert_eq!(sample.raw(), "01/06/2025;13:05;10:graph_P;3;");
    /// ```
    pub fn from_fields<S: AsRef<str>>(timestamp: OffsetDateTime, fields: &[S]) -> Self {
        let mut raw = format_timestamp(timestamp);
        raw.push(FIELD_SEPARATOR);
        for field in fields {
            raw.push_str(field.as_ref());
            raw.push(FIELD_SEPARATOR);
        }
        Self { raw }
    }

    /// The line exactly as stored.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Consume the sample and return the stored line.
    pub fn into_raw(self) -> String {
        self.raw
    }

    /// Whether the line carries no data at all.
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// The date prefix: everything before the first `;`.
    pub fn date(&self) -> &str {
        match self.raw.split_once(FIELD_SEPARATOR) {
            Some((date, _)) => date,
            None => &self.raw,
        }
    }

    /// The `mm/yyyy` part of the date prefix.
    pub fn month(&self) -> Option<&str> {
        self.date().get(3..10)
    }

    /// The `yyyy` part of the date prefix.
    pub fn year(&self) -> Option<&str> {
        self.date().get(6..10)
    }

    /// The `hh:mm` time field.
    pub fn time(&self) -> Option<&str> {
        self.raw.split(FIELD_SEPARATOR).nth(1)
    }

    /// Minutes since midnight, if the time field parses.
    pub fn minute_of_day(&self) -> Option<u16> {
        let time = Time::parse(self.time()?.trim(), format_description!("[hour]:[minute]")).ok()?;
        Some(u16::from(time.hour()) * 60 + u16::from(time.minute()))
    }

    /// The sensor portion of the line (after `date;time;`).
    pub fn sensor_data(&self) -> &str {
        self.raw.splitn(3, FIELD_SEPARATOR).nth(2).unwrap_or("")
    }

    /// Iterate over the raw sensor fields.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        codec::sensor_fields(self.sensor_data())
    }

    /// The `index`-th raw sensor field, or `""`.
    pub fn field(&self, index: usize) -> &str {
        codec::field_at(self.sensor_data(), index)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Format a timestamp as the `dd/mm/yyyy;hh:mm` sample prefix.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    let format = format_description!("[day]/[month]/[year];[hour]:[minute]");
    // Every component in the description is numeric, so formatting cannot fail.
    timestamp.format(format).unwrap_or_default()
}

/// Sensor layout of one device log, derived from its first line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSchema {
    labels: Vec<Option<String>>,
}

impl DeviceSchema {
    /// Derive the schema from the first line of a log.
    ///
    /// ```
    /// use snse_types::{DeviceSchema, Sample};
    ///
    /// let first = Sample::parse("01/06/2025;00:00;10:graph_P;4;");
    /// let schema = DeviceSchema::from_first_line(&first);
    /// assert_eq!(schema.sensor_count(), 2);
    /// assert_eq!(schema.label(0), Some("graph_P"));
    /// assert_eq!(schema.label(1), None);
    /// ```
    pub fn from_first_line(sample: &Sample) -> Self {
        let labels = sample
            .fields()
            .map(|field| match codec::label_of(field) {
                "" => None,
                label => Some(label.to_string()),
            })
            .collect();
        Self { labels }
    }

    /// Number of sensor positions per line.
    pub fn sensor_count(&self) -> usize {
        self.labels.len()
    }

    /// Whether the log carries no sensor positions.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The graph label of a sensor position, if its first-line field had one.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).and_then(|label| label.as_deref())
    }

    /// Read every sensor value of `sample`, in schema order.
    ///
    /// Missing or malformed fields read as `0.0`.
    pub fn values(&self, sample: &Sample) -> Vec<f64> {
        let mut values = vec![0.0; self.sensor_count()];
        for (slot, field) in values.iter_mut().zip(sample.fields()) {
            *slot = codec::parse_value(field);
        }
        values
    }

    /// Render an aggregate record: `key;sum1[:label1];...;sumN[:labelN];`.
    pub fn format_record(&self, key: &str, sums: &[f64]) -> String {
        let mut record = String::from(key);
        record.push(FIELD_SEPARATOR);
        for (i, sum) in sums.iter().enumerate() {
            record.push_str(&codec::with_label(*sum, self.label(i)));
            record.push(FIELD_SEPARATOR);
        }
        record
    }
}

/// Multiplier converting an instantaneous reading into its contribution to a
/// period sum.
///
/// Derived once per log from the gap between its first two lines, in hours.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Calibration(f64);

impl Calibration {
    /// Calibration used when no sampling gap can be measured.
    pub const UNIT: Self = Self(1.0);

    /// Derive the calibration from the first two lines of a log.
    ///
    /// Returns [`Calibration::UNIT`] when there is no second line or either
    /// time field does not parse.
    ///
    /// ```
    /// use snse_types::{Calibration, Sample};
    ///
    /// let first = Sample::parse("01/06/2025;00:00;10;");
    /// let second = Sample::parse("01/06/2025;00:15;10;");
    /// assert_eq!(Calibration::from_samples(&first, Some(&second)).hours(), 0.25);
    /// ```
    pub fn from_samples(first: &Sample, second: Option<&Sample>) -> Self {
        let Some(second) = second else {
            return Self::UNIT;
        };
        match (first.minute_of_day(), second.minute_of_day()) {
            (Some(a), Some(b)) => Self(f64::from(a.abs_diff(b)) / 60.0),
            _ => Self::UNIT,
        }
    }

    /// The sampling interval in hours.
    pub fn hours(&self) -> f64 {
        self.0
    }

    /// Weight a reading by the sampling interval.
    pub fn apply(&self, value: f64) -> f64 {
        value * self.0
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::UNIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sample_accessors() {
        let sample = Sample::parse("01/06/2025;13:45;10:graph_P;4;\r");
        assert_eq!(sample.raw(), "01/06/2025;13:45;10:graph_P;4;");
        assert_eq!(sample.date(), "01/06/2025");
        assert_eq!(sample.month(), Some("06/2025"));
        assert_eq!(sample.year(), Some("2025"));
        assert_eq!(sample.time(), Some("13:45"));
        assert_eq!(sample.minute_of_day(), Some(13 * 60 + 45));
        assert_eq!(sample.sensor_data(), "10:graph_P;4;");
        assert_eq!(sample.field(1), "4");
    }

    #[test]
    fn test_sample_short_line() {
        let sample = Sample::parse("01/06");
        assert_eq!(sample.date(), "01/06");
        assert_eq!(sample.month(), None);
        assert_eq!(sample.year(), None);
        assert_eq!(sample.time(), None);
        assert_eq!(sample.sensor_data(), "");
        assert_eq!(sample.fields().count(), 0);
    }

    #[test]
    fn test_sample_blank() {
        assert!(Sample::parse("  \r\n").is_blank());
        assert!(!Sample::parse("01/06/2025;00:00;1;").is_blank());
    }

    #[test]
    fn test_from_fields_terminates_line() {
        let sample = Sample::from_fields(datetime!(2025-12-31 23:59 UTC), &["1", "2:graph_x"]);
        assert_eq!(sample.raw(), "31/12/2025;23:59;1;2:graph_x;");
        assert_eq!(sample.fields().count(), 2);
    }

    #[test]
    fn test_schema_without_terminator() {
        let schema = DeviceSchema::from_first_line(&Sample::parse("01/06/2025;00:00;10:graph_P"));
        assert_eq!(schema.sensor_count(), 1);
        assert_eq!(schema.label(0), Some("graph_P"));
    }

    #[test]
    fn test_schema_zero_sensors() {
        let schema = DeviceSchema::from_first_line(&Sample::parse("01/06/2025;00:00;"));
        assert!(schema.is_empty());
        let schema = DeviceSchema::from_first_line(&Sample::parse("01/06/2025"));
        assert!(schema.is_empty());
    }

    #[test]
    fn test_schema_values_pads_and_truncates() {
        let schema = DeviceSchema::from_first_line(&Sample::parse("d;t;1;2;3;"));
        assert_eq!(schema.values(&Sample::parse("d;t;4;x;")), vec![4.0, 0.0, 0.0]);
        assert_eq!(schema.values(&Sample::parse("d;t;1;2;3;9;")), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_format_record_labels_follow_schema() {
        let schema = DeviceSchema::from_first_line(&Sample::parse("d;t;1:graph_P;2;"));
        assert_eq!(
            schema.format_record("01/06/2025", &[30.0, 1.5]),
            "01/06/2025;30.000000:graph_P;1.500000;"
        );
    }

    #[test]
    fn test_calibration_hour_gap() {
        let first = Sample::parse("01/06/2025;00:00;10;");
        let second = Sample::parse("01/06/2025;01:00;20;");
        assert_eq!(Calibration::from_samples(&first, Some(&second)), Calibration::UNIT);
    }

    #[test]
    fn test_calibration_is_absolute() {
        let first = Sample::parse("01/06/2025;10:30;1;");
        let second = Sample::parse("01/06/2025;10:00;1;");
        assert_eq!(Calibration::from_samples(&first, Some(&second)).hours(), 0.5);
    }

    #[test]
    fn test_calibration_single_line_or_bad_time() {
        let first = Sample::parse("01/06/2025;00:00;10;");
        assert_eq!(Calibration::from_samples(&first, None), Calibration::UNIT);
        let broken = Sample::parse("01/06/2025;xx:yy;10;");
        assert_eq!(Calibration::from_samples(&first, Some(&broken)), Calibration::UNIT);
    }

    #[test]
    fn test_calibration_apply() {
        let calibration = Calibration::from_samples(
            &Sample::parse("d;00:00;1;"),
            Some(&Sample::parse("d;00:06;1;")),
        );
        assert!((calibration.apply(50.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(datetime!(2025-01-02 03:04 UTC)), "02/01/2025;03:04");
    }
}
