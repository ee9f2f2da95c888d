//! Application state shared across connection and collector tasks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snse_store::LogStore;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::response::{Response, Status};

/// Shared application state.
///
/// The log store is stateless between requests (every query reopens the
/// device file), so no lock is needed around it.
pub struct AppState {
    /// The device log directory.
    pub store: LogStore,
    /// Configuration, fixed for the lifetime of the process.
    pub config: Config,
    /// Query server counters.
    pub stats: ServerStats,
    /// Per-device collection stats.
    pub device_stats: RwLock<Vec<DeviceCollectionStats>>,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: LogStore, config: Config) -> Arc<Self> {
        let device_stats = config
            .devices
            .iter()
            .map(|device| DeviceCollectionStats {
                device_id: device.address.clone(),
                alias: device.alias.clone(),
                poll_interval: device.poll_interval,
                ..DeviceCollectionStats::default()
            })
            .collect();
        Arc::new(Self {
            store,
            config,
            stats: ServerStats::default(),
            device_stats: RwLock::new(device_stats),
        })
    }

    /// Record a successful poll of `device_id`.
    pub async fn record_poll_success(&self, device_id: &str) {
        let mut stats = self.device_stats.write().await;
        if let Some(entry) = stats.iter_mut().find(|s| s.device_id == device_id) {
            entry.last_poll_at = Some(OffsetDateTime::now_utc());
            entry.success_count += 1;
        }
    }

    /// Record a failed poll of `device_id`.
    pub async fn record_poll_failure(&self, device_id: &str, error: String) {
        let mut stats = self.device_stats.write().await;
        if let Some(entry) = stats.iter_mut().find(|s| s.device_id == device_id) {
            entry.last_error_at = Some(OffsetDateTime::now_utc());
            entry.last_error = Some(error);
            entry.failure_count += 1;
        }
    }

    /// Log the query counters and one line per polled device.
    pub async fn log_summary(&self) {
        let stats = self.stats.snapshot();
        info!("Query server: {}", stats);
        for device in self.device_stats.read().await.iter() {
            info!("Collector: {}", device);
        }
    }
}

/// Counters kept by the query server.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections: AtomicU64,
    requests: AtomicU64,
    ok: AtomicU64,
    not_found: AtomicU64,
    bad_request: AtomicU64,
}

impl ServerStats {
    /// Count an accepted connection.
    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a handled request by its response.
    pub fn record(&self, response: &Response) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match response.status() {
            Some(Status::Ok) => &self.ok,
            Some(Status::NotFound) => &self.not_found,
            Some(Status::BadRequest) | None => &self.bad_request,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            ok: self.ok.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            bad_request: self.bad_request.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub requests: u64,
    pub ok: u64,
    pub not_found: u64,
    /// Framed `400` replies plus unframed replies.
    pub bad_request: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} connection(s), {} request(s): {} ok, {} not found, {} bad request",
            self.connections, self.requests, self.ok, self.not_found, self.bad_request
        )
    }
}

/// Collection statistics for a single device.
#[derive(Debug, Clone, Default)]
pub struct DeviceCollectionStats {
    /// Device ID/address.
    pub device_id: String,
    /// Device alias.
    pub alias: Option<String>,
    /// Poll interval in seconds.
    pub poll_interval: u64,
    /// Time of last successful poll.
    pub last_poll_at: Option<OffsetDateTime>,
    /// Time of last failed poll.
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful polls.
    pub success_count: u64,
    /// Total failed polls.
    pub failure_count: u64,
}

impl fmt::Display for DeviceCollectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} ({})", alias, self.device_id)?,
            None => write!(f, "{}", self.device_id)?,
        }
        write!(
            f,
            " every {}s: {} ok, {} failed",
            self.poll_interval, self.success_count, self.failure_count
        )?;
        if let Some(at) = self.last_poll_at {
            write!(f, ", last poll {}", at)?;
        }
        if let (Some(at), Some(error)) = (self.last_error_at, &self.last_error) {
            write!(f, ", last error {}: {}", at, error)?;
        }
        Ok(())
    }
}
