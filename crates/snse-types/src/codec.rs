//! Field codec for sensor fields.
//!
//! A sensor field is either a bare number (`"81.75"`) or a number with a
//! graph marker (`"81.75:graph_Power (W)_Energy (Wh)"`). The label after the
//! first `:` is metadata for chart rendering and never takes part in
//! arithmetic.

/// Separator between fields of a sample line.
pub const FIELD_SEPARATOR: char = ';';

/// Separator between a field's value and its graph label.
pub const MARKER_SEPARATOR: char = ':';

/// Return the numeric part of a field.
///
/// # Examples
///
/// ```
/// use snse_types::codec::strip_marker;
///
/// assert_eq!(strip_marker("12.5:graph_Power (W)_Energy (Wh)"), "12.5");
/// assert_eq!(strip_marker("12.5"), "12.5");
/// ```
#[must_use]
pub fn strip_marker(field: &str) -> &str {
    match field.split_once(MARKER_SEPARATOR) {
        Some((value, _)) => value,
        None => field,
    }
}

/// Return the graph label of a field, or `""` when it has none.
///
/// # Examples
///
/// ```
/// use snse_types::codec::label_of;
///
/// assert_eq!(label_of("12.5:graph_Power (W)_Energy (Wh)"), "graph_Power (W)_Energy (Wh)");
/// assert_eq!(label_of("12.5"), "");
/// ```
#[must_use]
pub fn label_of(field: &str) -> &str {
    match field.split_once(MARKER_SEPARATOR) {
        Some((_, label)) => label,
        None => "",
    }
}

/// Iterate over the `;`-delimited fields of the sensor portion of a line.
///
/// A trailing `;` terminates the last field and does not produce an extra
/// empty one, so `"1;2;"` and `"1;2"` both yield two fields.
pub fn sensor_fields(data: &str) -> impl Iterator<Item = &str> {
    let data = data.strip_suffix(FIELD_SEPARATOR).unwrap_or(data);
    let empty = data.is_empty();
    data.split(FIELD_SEPARATOR).filter(move |_| !empty)
}

/// Return the `index`-th field (0-based) of the sensor portion of a line, or
/// `""` when out of range.
///
/// # Examples
///
/// ```
/// use snse_types::codec::field_at;
///
/// let data = "81.75:graph_W;12;3.5;";
/// assert_eq!(field_at(data, 0), "81.75:graph_W");
/// assert_eq!(field_at(data, 2), "3.5");
/// assert_eq!(field_at(data, 3), "");
/// ```
#[must_use]
pub fn field_at(data: &str, index: usize) -> &str {
    sensor_fields(data).nth(index).unwrap_or("")
}

/// Parse the numeric value of a field, ignoring its graph marker.
///
/// Anything that does not parse as a number contributes `0.0`; a single bad
/// field never invalidates the rest of a log.
#[must_use]
pub fn parse_value(field: &str) -> f64 {
    strip_marker(field).trim().parse::<f64>().unwrap_or(0.0)
}

/// Format an aggregated value, reattaching `label` when it is non-empty.
///
/// Values are rendered with six decimals, the format downstream chart
/// clients expect.
///
/// # Examples
///
/// ```
/// use snse_types::codec::with_label;
///
/// assert_eq!(with_label(30.0, Some("graph_P")), "30.000000:graph_P");
/// assert_eq!(with_label(5.0, None), "5.000000");
/// ```
#[must_use]
pub fn with_label(value: f64, label: Option<&str>) -> String {
    match label {
        Some(label) if !label.is_empty() => format!("{value:.6}{MARKER_SEPARATOR}{label}"),
        _ => format!("{value:.6}"),
    }
}
