//! Aggregation results.

use serde::Serialize;

use snse_types::DeviceSchema;

/// Per-sensor sums for one period (a day, or a month within a year).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotal {
    /// Period key: `dd/mm/yyyy` for days, `mm/yyyy` for months.
    pub period: String,
    /// One calibrated sum per sensor position, in schema order.
    pub sums: Vec<f64>,
}

impl PeriodTotal {
    /// A zero-initialized bucket for `width` sensors.
    pub fn zeroed(period: &str, width: usize) -> Self {
        Self {
            period: period.to_string(),
            sums: vec![0.0; width],
        }
    }

    /// Add one value per sensor into the bucket.
    pub fn add(&mut self, values: &[f64]) {
        for (sum, value) in self.sums.iter_mut().zip(values) {
            *sum += value;
        }
    }
}

/// Ordered period totals together with the schema needed to label them.
#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    /// Device the totals were computed for.
    pub device_id: String,
    /// Schema of the source log; supplies the graph labels.
    pub schema: DeviceSchema,
    /// One entry per period, in file-encounter order.
    pub periods: Vec<PeriodTotal>,
}

impl Totals {
    /// Render every period as `key;sum1[:label1];...;sumN[:labelN];`.
    pub fn records(&self) -> impl Iterator<Item = String> + '_ {
        self.periods
            .iter()
            .map(|period| self.schema.format_record(&period.period, &period.sums))
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// Whether no period produced a total.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}
