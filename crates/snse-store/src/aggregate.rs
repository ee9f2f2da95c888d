//! Day, month and year queries over a device log.
//!
//! Every query streams the log once through [`DeviceLog::samples`]. Nothing
//! is cached between queries: results always reflect the file as it is when
//! the scan runs.
//!
//! Sums are weighted by the log's [`Calibration`](snse_types::Calibration),
//! so a constant reading `V` sampled every `m` minutes contributes
//! `V * m / 60` per sample.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use snse_types::Sample;

use crate::error::{Error, Result};
use crate::models::{PeriodTotal, Totals};
use crate::store::DeviceLog;

impl DeviceLog {
    /// Distinct `dd/mm/yyyy` dates, in first-seen order.
    pub fn days(&self) -> Result<Vec<String>> {
        self.distinct(|sample| Some(sample.date()))
    }

    /// Every raw line whose date contains `day` as a substring.
    ///
    /// Matching is unanchored: `"1/06/2025"` also selects
    /// `11/06/2025` and `21/06/2025`.
    pub fn day_detail(&self, day: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for sample in self.samples()? {
            let sample = sample?;
            if sample.date().contains(day) {
                lines.push(sample.into_raw());
            }
        }

        if lines.is_empty() {
            return Err(self.no_match(day));
        }
        Ok(lines)
    }

    /// Distinct `mm/yyyy` months, in first-seen order.
    pub fn months(&self) -> Result<Vec<String>> {
        self.distinct(Sample::month)
    }

    /// Per-day calibrated sums for one `mm/yyyy` month.
    ///
    /// A new day bucket opens whenever a matching line's date differs from
    /// the previous matching line's date, so days are reported in the order
    /// the log first reaches them.
    pub fn month_total(&self, month: &str) -> Result<Totals> {
        let width = self.sensor_width()?;
        let mut days = DayRollup::new(width);

        for sample in self.samples()? {
            let sample = sample?;
            if sample.month() == Some(month) {
                days.add(sample.date(), &self.weighted_values(&sample));
            }
        }

        if days.is_empty() {
            return Err(self.no_match(month));
        }

        debug!(
            "Month {} on {}: {} day(s)",
            month,
            self.device_id(),
            days.periods.len()
        );
        Ok(self.totals(days.periods))
    }

    /// Distinct `yyyy` years, in first-seen order.
    pub fn years(&self) -> Result<Vec<String>> {
        self.distinct(Sample::year)
    }

    /// Per-month sums for one `yyyy` year.
    ///
    /// Each month total is the plain sum of that month's day totals, and
    /// months are reported in first-seen order.
    pub fn year_total(&self, year: &str) -> Result<Totals> {
        let width = self.sensor_width()?;
        let mut months: Vec<(String, DayRollup)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for sample in self.samples()? {
            let sample = sample?;
            if sample.year() != Some(year) {
                continue;
            }
            let Some(month) = sample.month() else {
                continue;
            };

            let slot = match index.get(month) {
                Some(&slot) => slot,
                None => {
                    index.insert(month.to_string(), months.len());
                    months.push((month.to_string(), DayRollup::new(width)));
                    months.len() - 1
                }
            };
            months[slot]
                .1
                .add(sample.date(), &self.weighted_values(&sample));
        }

        if months.is_empty() {
            return Err(self.no_match(year));
        }

        let periods: Vec<PeriodTotal> = months
            .into_iter()
            .map(|(month, days)| days.collapse(&month))
            .collect();

        debug!(
            "Year {} on {}: {} month(s)",
            year,
            self.device_id(),
            periods.len()
        );
        Ok(self.totals(periods))
    }

    fn distinct<F>(&self, key: F) -> Result<Vec<String>>
    where
        F: Fn(&Sample) -> Option<&str>,
    {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for sample in self.samples()? {
            let sample = sample?;
            if let Some(key) = key(&sample)
                && seen.insert(key.to_string())
            {
                keys.push(key.to_string());
            }
        }

        if keys.is_empty() {
            return Err(Error::NotFound(self.device_id().to_string()));
        }
        Ok(keys)
    }

    fn sensor_width(&self) -> Result<usize> {
        match self.schema().sensor_count() {
            0 => Err(Error::NoSensors(self.device_id().to_string())),
            width => Ok(width),
        }
    }

    fn weighted_values(&self, sample: &Sample) -> Vec<f64> {
        let calibration = self.calibration();
        self.schema()
            .values(sample)
            .into_iter()
            .map(|value| calibration.apply(value))
            .collect()
    }

    fn totals(&self, periods: Vec<PeriodTotal>) -> Totals {
        Totals {
            device_id: self.device_id().to_string(),
            schema: self.schema().clone(),
            periods,
        }
    }

    fn no_match(&self, selector: &str) -> Error {
        Error::NoMatch {
            device: self.device_id().to_string(),
            selector: selector.to_string(),
        }
    }
}

/// Day buckets, opened whenever the date changes between consecutive adds.
struct DayRollup {
    width: usize,
    periods: Vec<PeriodTotal>,
}

impl DayRollup {
    fn new(width: usize) -> Self {
        Self {
            width,
            periods: Vec::new(),
        }
    }

    fn add(&mut self, date: &str, values: &[f64]) {
        let current = self
            .periods
            .last()
            .is_some_and(|bucket| bucket.period == date);
        if !current {
            self.periods.push(PeriodTotal::zeroed(date, self.width));
        }
        if let Some(bucket) = self.periods.last_mut() {
            bucket.add(values);
        }
    }

    fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Sum every day bucket into a single total keyed by `period`.
    fn collapse(self, period: &str) -> PeriodTotal {
        let mut total = PeriodTotal::zeroed(period, self.width);
        for day in &self.periods {
            total.add(&day.sums);
        }
        total
    }
}
