//! Append-only device logs and day/month/year aggregation for SNSE sensor
//! data.
//!
//! Each device writes one text file, `<root>/<device-id>.txt`, with one
//! sample line per reading. This crate opens those logs, streams their
//! samples, and rolls them up into calibrated per-day, per-month and
//! per-year sums on demand.
//!
//! # Features
//!
//! - Line-atomic appends (one write and flush per sample)
//! - Schema and calibration derived once when a log is opened
//! - Day, month and year listings in first-seen order
//! - Calibrated day totals per month and month totals per year
//!
//! # Example
//!
//! ```no_run
//! use snse_store::LogStore;
//!
//! let store = LogStore::open_default();
//! let log = store.open("192.168.1.6")?;
//!
//! for record in log.month_total("06/2025")?.records() {
//!     println!("{record}");
//! }
//! # Ok::<(), snse_store::Error>(())
//! ```

mod aggregate;
mod error;
mod models;
mod store;

pub use error::{Error, Result};
pub use models::{PeriodTotal, Totals};
pub use store::{DeviceLog, LogStore, SampleReader};

/// Default log directory: `devs` under the working directory.
pub fn default_log_root() -> std::path::PathBuf {
    std::path::PathBuf::from("devs")
}
