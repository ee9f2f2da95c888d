//! Server configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Query server settings.
    pub server: ServerConfig,
    /// Log storage settings.
    pub storage: StorageConfig,
    /// Collector settings shared by all devices.
    pub collector: CollectorConfig,
    /// Devices to poll.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults.
    ///
    /// A missing file yields the defaults silently; a file that cannot be
    /// read or parsed is reported at `warn` before falling back.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Read buffer and request idle time are within bounds
    /// - Log root is not empty
    /// - Collector port and timeout are usable
    /// - Device addresses are not empty and sensor counts are positive
    /// - Device poll intervals are within reasonable bounds (10s - 1 hour)
    /// - No duplicate device addresses
    ///
    /// # Example
    ///
    /// ```
    /// use snse_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.collector.validate());

        let mut seen_addresses = std::collections::HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{}]", i);
            errors.extend(device.validate(&prefix));

            if !seen_addresses.insert(device.address.to_lowercase()) {
                errors.push(ValidationError {
                    field: format!("{}.address", prefix),
                    message: format!("duplicate device address '{}'", device.address),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Default query port.
pub const DEFAULT_QUERY_PORT: u16 = 34678;

/// Smallest accepted socket read buffer in bytes.
pub const MIN_READ_BUFFER: usize = 64;
/// Largest accepted socket read buffer in bytes.
pub const MAX_READ_BUFFER: usize = 64 * 1024;

/// Accepted range for `server.request_idle_ms`.
pub const REQUEST_IDLE_RANGE_MS: std::ops::RangeInclusive<u64> = 10..=10_000;

/// Query server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:34678").
    pub bind: String,
    /// Answer a query without `dev=` with a `400` frame instead of the bare
    /// text line older clients expect.
    pub frame_missing_dev: bool,
    /// Longest request line in bytes. Input that reaches this size without
    /// a newline is answered as one request.
    pub read_buffer: usize,
    /// How long an unterminated request may sit idle, in milliseconds,
    /// before it is answered without waiting for its newline.
    pub request_idle_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_QUERY_PORT),
            frame_missing_dev: false,
            read_buffer: 1024,
            request_idle_ms: 500,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            // Check for valid host:port format
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else {
                let port_str = parts[0];
                match port_str.parse::<u16>() {
                    Ok(0) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: "port cannot be 0".to_string(),
                        });
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: format!(
                                "invalid port '{}': must be a number 1-65535",
                                port_str
                            ),
                        });
                    }
                    Ok(_) => {}
                }
            }
        }

        if !(MIN_READ_BUFFER..=MAX_READ_BUFFER).contains(&self.read_buffer) {
            errors.push(ValidationError {
                field: "server.read_buffer".to_string(),
                message: format!(
                    "read buffer {} out of range ({}-{} bytes)",
                    self.read_buffer, MIN_READ_BUFFER, MAX_READ_BUFFER
                ),
            });
        }

        if !REQUEST_IDLE_RANGE_MS.contains(&self.request_idle_ms) {
            errors.push(ValidationError {
                field: "server.request_idle_ms".to_string(),
                message: format!(
                    "request idle timeout {}ms out of range ({}-{}ms)",
                    self.request_idle_ms,
                    REQUEST_IDLE_RANGE_MS.start(),
                    REQUEST_IDLE_RANGE_MS.end()
                ),
            });
        }

        errors
    }
}

/// Log storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one `<device-id>.txt` log per device.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: snse_store::default_log_root(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.root".to_string(),
                message: "log directory cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Default device feature port.
pub const DEFAULT_DEVICE_PORT: u16 = 34677;

/// Collector configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Port devices answer `GET ?features` on, unless overridden per device.
    pub device_port: u16,
    /// Connect/read timeout for one poll, in seconds.
    pub timeout: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            device_port: DEFAULT_DEVICE_PORT,
            timeout: 10,
        }
    }
}

impl CollectorConfig {
    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.device_port == 0 {
            errors.push(ValidationError {
                field: "collector.device_port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.timeout == 0 {
            errors.push(ValidationError {
                field: "collector.timeout".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Configuration for a device to poll.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Device address; also the log's device id.
    pub address: String,
    /// Number of sensor values to read from each response.
    pub sensors: usize,
    /// Friendly alias for the device, used in logs.
    #[serde(default)]
    pub alias: Option<String>,
    /// Feature port override.
    #[serde(default)]
    pub port: Option<u16>,
    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Minimum poll interval in seconds (10 seconds).
pub const MIN_POLL_INTERVAL: u64 = 10;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

fn default_poll_interval() -> u64 {
    60
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: "device address cannot be empty".to_string(),
            });
        } else if self.address.contains(['/', '\\']) || self.address.contains("..") {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: format!(
                    "device address '{}' cannot be used as a log file name",
                    self.address
                ),
            });
        }

        if self.sensors == 0 {
            errors.push(ValidationError {
                field: format!("{}.sensors", prefix),
                message: "sensor count must be at least 1".to_string(),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (use null/omit instead)".to_string(),
            });
        }

        if self.port == Some(0) {
            errors.push(ValidationError {
                field: format!("{}.port", prefix),
                message: "port cannot be 0".to_string(),
            });
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        errors
    }

    /// Name used in log messages.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.address)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `devices[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snse")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str) -> DeviceConfig {
        DeviceConfig {
            address: address.to_string(),
            sensors: 3,
            alias: None,
            port: None,
            poll_interval: 60,
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:34678");
        assert!(!config.server.frame_missing_dev);
        assert_eq!(config.server.read_buffer, 1024);
        assert_eq!(config.collector.device_port, 34677);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.root, snse_store::default_log_root());
    }

    #[test]
    fn test_device_config_serde() {
        let toml = r#"
            address = "192.168.1.6"
            sensors = 3
            alias = "Kitchen"
            port = 8080
            poll_interval = 120
        "#;
        let config: DeviceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.address, "192.168.1.6");
        assert_eq!(config.sensors, 3);
        assert_eq!(config.alias, Some("Kitchen".to_string()));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.poll_interval, 120);
        assert_eq!(config.display_name(), "Kitchen");
    }

    #[test]
    fn test_device_config_defaults() {
        let toml = r#"
            address = "192.168.1.6"
            sensors = 1
        "#;
        let config: DeviceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval, 60);
        assert_eq!(config.alias, None);
        assert_eq!(config.port, None);
        assert_eq!(config.display_name(), "192.168.1.6");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(temp_dir.path().join("server.toml"));
        assert_eq!(config.server.bind, "0.0.0.0:34678");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("server.toml");
        std::fs::write(
            &config_path,
            "[server]\nbind = \"0.0.0.0:9090\"\n\n[[devices]]\naddress = \"192.168.1.6\"\nsensors = 2\n",
        )
        .unwrap();

        let config = Config::load_or_default(&config_path);
        assert_eq!(config.server.bind, "0.0.0.0:9090");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].sensors, 2);
    }

    #[test]
    fn test_load_or_default_falls_back_on_malformed_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("server.toml");
        std::fs::write(&config_path, "[server\nbind = 9090").unwrap();

        let config = Config::load_or_default(&config_path);
        assert_eq!(config.server.bind, ServerConfig::default().bind);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:4000"
            frame_missing_dev = true

            [storage]
            root = "/var/lib/snse/devs"

            [collector]
            timeout = 5

            [[devices]]
            address = "192.168.1.6"
            sensors = 3
            alias = "Kitchen"

            [[devices]]
            address = "192.168.1.7"
            sensors = 1
            poll_interval = 300
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:4000");
        assert!(config.server.frame_missing_dev);
        assert_eq!(config.server.read_buffer, 1024);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/snse/devs"));
        assert_eq!(config.collector.timeout, 5);
        assert_eq!(config.collector.device_port, 34677);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].alias, Some("Kitchen".to_string()));
        assert_eq!(config.devices[1].poll_interval, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("snse/server.toml"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Read {
            path: PathBuf::from("/test/path"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let display = format!("{}", error);
        assert!(display.contains("/test/path"));
        assert!(display.contains("not found"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let valid = ServerConfig::default();
        assert!(valid.validate().is_empty());

        let valid_ipv6 = ServerConfig {
            bind: "[::1]:34678".to_string(),
            ..ServerConfig::default()
        };
        assert!(valid_ipv6.validate().is_empty());

        let empty = ServerConfig {
            bind: "".to_string(),
            ..ServerConfig::default()
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let no_port = ServerConfig {
            bind: "127.0.0.1".to_string(),
            ..ServerConfig::default()
        };
        let errors = no_port.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("host:port"));

        let port_zero = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let errors = port_zero.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be 0"));

        let bad_port = ServerConfig {
            bind: "127.0.0.1:abc".to_string(),
            ..ServerConfig::default()
        };
        let errors = bad_port.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must be a number"));
    }

    #[test]
    fn test_read_buffer_validation() {
        for read_buffer in [0, 63, 64 * 1024 + 1] {
            let config = ServerConfig {
                read_buffer,
                ..ServerConfig::default()
            };
            let errors = config.validate();
            assert_eq!(errors.len(), 1, "read_buffer {read_buffer}");
            assert_eq!(errors[0].field, "server.read_buffer");
        }
    }

    #[test]
    fn test_request_idle_validation() {
        assert_eq!(ServerConfig::default().request_idle_ms, 500);
        for request_idle_ms in [0, 9, 10_001] {
            let config = ServerConfig {
                request_idle_ms,
                ..ServerConfig::default()
            };
            let errors = config.validate();
            assert_eq!(errors.len(), 1, "request_idle_ms {request_idle_ms}");
            assert_eq!(errors[0].field, "server.request_idle_ms");
        }
    }

    #[test]
    fn test_storage_root_validation() {
        let empty = StorageConfig {
            root: PathBuf::new(),
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));
    }

    #[test]
    fn test_collector_validation() {
        let config = CollectorConfig {
            device_port: 0,
            timeout: 0,
        };
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn test_device_config_validation() {
        assert!(device("192.168.1.6").validate("devices[0]").is_empty());

        let empty = device("");
        let errors = empty.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let traversal = device("../etc");
        let errors = traversal.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("log file name"));

        let no_sensors = DeviceConfig {
            sensors: 0,
            ..device("192.168.1.6")
        };
        let errors = no_sensors.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "devices[0].sensors");

        let empty_alias = DeviceConfig {
            alias: Some(String::new()),
            ..device("192.168.1.6")
        };
        assert_eq!(empty_alias.validate("devices[0]").len(), 1);

        let short_poll = DeviceConfig {
            poll_interval: 5,
            ..device("192.168.1.6")
        };
        let errors = short_poll.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        let long_poll = DeviceConfig {
            poll_interval: 7200,
            ..device("192.168.1.6")
        };
        let errors = long_poll.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too long"));
    }

    #[test]
    fn test_duplicate_device_addresses() {
        let config = Config {
            devices: vec![device("Sensor-A"), device("sensor-a")],
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        if let Err(ConfigError::Validation(errors)) = result {
            assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let errors = vec![
            ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            },
            ValidationError {
                field: "devices[0].address".to_string(),
                message: "cannot be empty".to_string(),
            },
        ];
        let error = ConfigError::Validation(errors);
        let display = format!("{}", error);
        assert!(display.contains("server.bind"));
        assert!(display.contains("devices[0].address"));
    }
}
