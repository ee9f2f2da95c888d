//! Main store implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, info};

use snse_types::{Calibration, DeviceSchema, Sample};

use crate::error::{Error, Result};

/// Extension of device log files.
pub const LOG_EXTENSION: &str = "txt";

/// Directory of per-device append-only logs.
///
/// Each device has one file, `<root>/<device-id>.txt`, holding one sample
/// line per reading in insertion order. Lines are never rewritten.
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first append.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Open the default log directory (`devs` under the working directory).
    pub fn open_default() -> Self {
        Self::new(crate::default_log_root())
    }

    /// The directory holding the device logs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a device's log file.
    pub fn log_path(&self, device_id: &str) -> Result<PathBuf> {
        validate_device_id(device_id)?;
        Ok(self.root.join(format!("{device_id}.{LOG_EXTENSION}")))
    }

    /// Open a device log and derive its schema and calibration.
    ///
    /// Fails with [`Error::NotFound`] when the file does not exist or holds
    /// no lines.
    pub fn open(&self, device_id: &str) -> Result<DeviceLog> {
        let path = self.log_path(device_id)?;
        let mut samples = SampleReader::open(&path).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::NotFound(device_id.to_string())
            }
            other => other,
        })?;

        let first = samples
            .next()
            .transpose()?
            .ok_or_else(|| Error::NotFound(device_id.to_string()))?;
        let second = samples.next().transpose()?;

        let schema = DeviceSchema::from_first_line(&first);
        let calibration = Calibration::from_samples(&first, second.as_ref());

        debug!(
            "Opened log for {} ({} sensors, calibration {}h)",
            device_id,
            schema.sensor_count(),
            calibration.hours()
        );

        Ok(DeviceLog {
            device_id: device_id.to_string(),
            path,
            schema,
            calibration,
        })
    }

    /// Append one sample line to a device log.
    ///
    /// The line and its terminator go out in a single write followed by a
    /// flush, so a concurrent reader never sees half a line.
    pub fn append(&self, device_id: &str, sample: &Sample) -> Result<()> {
        let raw = sample.raw();
        if raw.contains(['\n', '\r']) || sample.is_blank() {
            return Err(Error::InvalidSample(raw.to_string()));
        }

        let path = self.log_path(device_id)?;
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| Error::CreateDirectory {
                path: self.root.clone(),
                source: e,
            })?;
            info!("Created log directory {}", self.root.display());
        }

        let mut line = String::with_capacity(raw.len() + 1);
        line.push_str(raw);
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("Appended sample to {}: {}", path.display(), raw);
        Ok(())
    }

    /// Timestamp `fields` with the current local time and append them.
    ///
    /// Falls back to UTC when the local offset cannot be determined.
    pub fn record<S: AsRef<str>>(&self, device_id: &str, fields: &[S]) -> Result<Sample> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let sample = Sample::from_fields(now, fields);
        self.append(device_id, &sample)?;
        Ok(sample)
    }

    /// List the ids of all devices with a log, sorted.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut devices = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                devices.push(stem.to_string());
            }
        }
        devices.sort();
        Ok(devices)
    }
}

/// An opened device log.
///
/// Holds the schema and calibration derived from the first two lines; the
/// samples themselves are streamed from disk on every call to
/// [`DeviceLog::samples`].
#[derive(Debug, Clone)]
pub struct DeviceLog {
    device_id: String,
    path: PathBuf,
    schema: DeviceSchema,
    calibration: Calibration,
}

impl DeviceLog {
    /// The device this log belongs to.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sensor layout derived from the first line.
    pub fn schema(&self) -> &DeviceSchema {
        &self.schema
    }

    /// Sampling calibration derived from the first two lines.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Stream the log from the beginning.
    ///
    /// Each call reopens the file, so the sequence also picks up lines
    /// appended since the log was opened.
    pub fn samples(&self) -> Result<SampleReader> {
        SampleReader::open(&self.path)
    }
}

/// Forward-only reader over the samples of a log file.
///
/// Blank lines are skipped. Bytes that are not valid UTF-8 are replaced
/// rather than failing the scan.
pub struct SampleReader {
    lines: std::io::Split<BufReader<File>>,
}

impl SampleReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).split(b'\n'),
        })
    }
}

impl Iterator for SampleReader {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let bytes = match self.lines.next()? {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(e.into())),
            };
            let sample = Sample::parse(&String::from_utf8_lossy(&bytes));
            if !sample.is_blank() {
                return Some(Ok(sample));
            }
        }
    }
}

fn validate_device_id(device_id: &str) -> Result<()> {
    let invalid = device_id.is_empty()
        || device_id == "."
        || device_id.contains("..")
        || device_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidDeviceId(device_id.to_string()));
    }
    Ok(())
}
