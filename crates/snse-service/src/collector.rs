//! Background data collector.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use snse_types::Sample;
use snse_types::features::{FEATURES_REQUEST, extract_sensor_values};

use crate::config::DeviceConfig;
use crate::state::AppState;

/// Largest feature response read from a device.
const RESPONSE_BUFFER: usize = 4096;

/// Background collector that polls devices on their configured intervals.
pub struct Collector {
    state: Arc<AppState>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start collecting data from all configured devices.
    ///
    /// This spawns a separate task for each device that polls at the configured interval
    /// until `cancel` fires. Returns immediately; collection happens in the background.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let devices = self.state.config.devices.clone();

        if devices.is_empty() {
            info!("No devices configured for collection");
            return Vec::new();
        }

        info!("Starting collector for {} device(s)", devices.len());

        devices
            .into_iter()
            .map(|device_config| {
                let state = Arc::clone(&self.state);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    collect_device(state, device_config, cancel).await;
                })
            })
            .collect()
    }
}

/// Collect readings from a single device.
async fn collect_device(state: Arc<AppState>, config: DeviceConfig, cancel: CancellationToken) {
    let device_id = config.address.as_str();
    let alias = config.display_name();
    let poll_interval = Duration::from_secs(config.poll_interval);

    info!(
        "Starting collector for {} (alias: {}, interval: {}s)",
        device_id, alias, config.poll_interval
    );

    let mut interval_timer = interval(poll_interval);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval_timer.tick() => {}
        }

        match poll_device(&state, &config).await {
            Ok(sample) => {
                consecutive_failures = 0;
                debug!("Collected sample from {}: {}", alias, sample);
                state.record_poll_success(device_id).await;
            }
            Err(e) => {
                consecutive_failures += 1;
                state.record_poll_failure(device_id, e.to_string()).await;
                if consecutive_failures <= 3 {
                    warn!("Failed to poll {}: {} (attempt {})", alias, e, consecutive_failures);
                } else if consecutive_failures == 4 {
                    error!(
                        "Failed to poll {} after {} attempts, will continue trying silently",
                        alias, consecutive_failures
                    );
                }
                // Continue trying - the device may come back online
            }
        }
    }

    info!("Stopped collector for {}", alias);
}

/// Poll a single device and append its reading to the device log.
pub async fn poll_device(state: &AppState, device: &DeviceConfig) -> Result<Sample, CollectorError> {
    let port = device.port.unwrap_or(state.config.collector.device_port);
    let limit = Duration::from_secs(state.config.collector.timeout);

    let response = timeout(limit, fetch_features(&device.address, port))
        .await
        .map_err(|_| CollectorError::Timeout(limit))?
        .map_err(CollectorError::Connect)?;

    let values = extract_sensor_values(&response, device.sensors)?;

    let store = state.store.clone();
    let device_id = device.address.clone();
    tokio::task::spawn_blocking(move || store.record(&device_id, &values))
        .await?
        .map_err(CollectorError::Store)
}

/// Send the feature request and read one response.
async fn fetch_features(address: &str, port: u16) -> std::io::Result<String> {
    let mut stream = TcpStream::connect((address, port)).await?;
    stream.write_all(FEATURES_REQUEST.as_bytes()).await?;

    let mut buf = BytesMut::with_capacity(RESPONSE_BUFFER);
    stream.read_buf(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to connect: {0}")]
    Connect(std::io::Error),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Failed to read: {0}")]
    Read(#[from] snse_types::ParseError),
    #[error("Failed to store: {0}")]
    Store(snse_store::Error),
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
