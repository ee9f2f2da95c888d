//! Query server and background collector for SNSE sensor logs.
//!
//! This crate provides a service that:
//! - Polls configured SNSE devices over TCP and appends their readings to
//!   per-device logs
//! - Answers line-based queries for day, month and year listings and totals
//!
//! # Query protocol
//!
//! A client sends one request per line and gets one response per request:
//!
//! ```text
//! GET ?dev=<device-id>&time=<days|months|years>[&data=<selector>]
//! ```
//!
//! - `time=days` lists days; with `data=<day>` it returns that day's raw lines
//! - `time=months` lists months; with `data=mm/yyyy` it returns per-day totals
//! - `time=years` lists years; with `data=yyyy` it returns per-month totals
//!
//! Responses are `<status>\n<body>\r\n` where status is `200 OK`,
//! `404 Not Found` or `400 Invalid request`.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/snse/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:34678"
//!
//! [storage]
//! root = "devs"
//!
//! [[devices]]
//! address = "192.168.1.6"
//! sensors = 3
//! alias = "kitchen"
//! poll_interval = 60
//! ```

pub mod collector;
pub mod config;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use collector::{Collector, CollectorError};
pub use config::{
    CollectorConfig, Config, ConfigError, DeviceConfig, ServerConfig, StorageConfig,
    ValidationError,
};
pub use response::{Response, Status};
pub use router::{Granularity, Outcome, Query, Request, RouteError};
pub use server::{QueryServer, RequestFramer, ServerError, answer_query};
pub use state::{AppState, DeviceCollectionStats, ServerStats, StatsSnapshot};
