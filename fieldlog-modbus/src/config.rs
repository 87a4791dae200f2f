//! Configuration for the logger.

use fieldlog_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::decode::DecodeError;
use crate::register::{BankKind, Encoding, RegisterSet, RegisterSpec};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] fieldlog_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Register '{register}': {source}")]
    Encoding {
        register: String,
        #[source]
        source: DecodeError,
    },
}

/// Complete logger configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    /// Device connection settings
    #[serde(default, alias = "ew1")]
    pub device: DeviceConfig,

    /// Registers to poll, in output column order
    #[serde(default)]
    pub registers: Vec<RegisterRecord>,

    /// Output settings
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Decode unknown data types as uint16 instead of rejecting them
    #[serde(default)]
    pub lenient_encodings: bool,
}

/// Configuration for the polled device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDeviceConfig")]
pub struct DeviceConfig {
    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    pub unit_id: u8,

    /// Connect and request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        RawDeviceConfig::default().into()
    }
}

/// Device section as written in the file.
///
/// Older files put `host`/`port` directly in the device section instead
/// of a `connection` object.
#[derive(Debug, Default, Deserialize)]
struct RawDeviceConfig {
    connection: Option<ConnectionConfig>,
    host: Option<String>,
    port: Option<u16>,
    unit_id: Option<u8>,
    timeout_ms: Option<u64>,
}

impl From<RawDeviceConfig> for DeviceConfig {
    fn from(raw: RawDeviceConfig) -> Self {
        let connection = raw.connection.unwrap_or_else(|| ConnectionConfig::Tcp {
            host: raw.host.unwrap_or_else(default_host),
            port: raw.port.unwrap_or_else(default_modbus_port),
        });

        Self {
            connection,
            unit_id: raw.unit_id.unwrap_or_else(default_unit_id),
            timeout_ms: raw.timeout_ms.unwrap_or_else(default_timeout_ms),
        }
    }
}

fn default_host() -> String {
    "192.168.1.100".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits, 5-8 (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default)]
        parity: Parity,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionConfig::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ConnectionConfig::Rtu {
                port, baud_rate, ..
            } => write!(f, "{} @ {} baud", port, baud_rate),
        }
    }
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// One register as written in the file.
///
/// Bank and data type stay strings here so that a typo is reported with
/// the register's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRecord {
    /// Starting address (0-based)
    pub address: u16,

    /// Unique name, used as the output column
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// "holding", "input", "coil", or "discrete"
    #[serde(default = "default_register_type")]
    pub register_type: String,

    /// Number of words; defaults to what the data type needs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u16>,

    /// "uint16", "int16", "uint32", "int32", or "float32"
    #[serde(default = "default_data_type")]
    pub data_type: String,

    /// Multiplier for the raw value
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Unit of measurement (display only)
    #[serde(default)]
    pub unit: String,
}

fn default_register_type() -> String {
    "holding".to_string()
}

fn default_data_type() -> String {
    "uint16".to_string()
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterRecord {
    /// Resolve the record into a typed spec.
    ///
    /// With `lenient`, an unknown data type falls back to uint16 (first
    /// word) and its `count` is not checked.
    pub fn to_spec(&self, lenient: bool) -> Result<RegisterSpec, ConfigError> {
        let bank: BankKind = self.register_type.parse().map_err(|e| {
            ConfigError::Validation(format!("Register '{}': {}", self.name, e))
        })?;

        let (encoding, check_count) = match self.data_type.parse::<Encoding>() {
            Ok(encoding) => (encoding, true),
            Err(e) if lenient => {
                warn!(
                    register = %self.name,
                    "{}; decoding as uint16",
                    e
                );
                if let Some(count) = self.count.filter(|&count| count != 1) {
                    warn!(
                        register = %self.name,
                        "count {} ignored; reading a single word",
                        count
                    );
                }
                (Encoding::Uint16, false)
            }
            Err(e) => {
                return Err(ConfigError::Encoding {
                    register: self.name.clone(),
                    source: e,
                });
            }
        };

        let spec = RegisterSpec::new(self.address, self.name.clone(), bank, encoding)
            .with_description(self.description.clone())
            .with_scale(self.scale)
            .with_unit(self.unit.clone());

        if let Some(count) = self.count {
            if check_count && count != spec.word_count() {
                return Err(ConfigError::Validation(format!(
                    "Register '{}': count {} does not match {} {} ({} expected)",
                    self.name,
                    count,
                    bank,
                    if bank.is_bit() { "bits" } else { encoding.as_str() },
                    spec.word_count()
                )));
            }
        }

        if !self.scale.is_finite() {
            return Err(ConfigError::Validation(format!(
                "Register '{}': scale must be a finite number",
                self.name
            )));
        }

        Ok(spec)
    }
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// CSV file rows are appended to
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
        }
    }
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("readings.csv")
}

impl LoggerConfig {
    /// Load and validate configuration from a JSON5 (or JSON) file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: LoggerConfig = fieldlog_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: LoggerConfig = fieldlog_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;

        if device.unit_id == 0 || device.unit_id > 247 {
            return Err(ConfigError::Validation(format!(
                "unit_id must be 1-247, got {}",
                device.unit_id
            )));
        }

        if device.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        match &device.connection {
            ConnectionConfig::Tcp { host, .. } => {
                if host.trim().is_empty() {
                    return Err(ConfigError::Validation(
                        "Device host cannot be empty".to_string(),
                    ));
                }
            }
            ConnectionConfig::Rtu {
                data_bits,
                stop_bits,
                ..
            } => {
                if !(5..=8).contains(data_bits) {
                    return Err(ConfigError::Validation(format!(
                        "data_bits must be 5-8, got {}",
                        data_bits
                    )));
                }
                if !(1..=2).contains(stop_bits) {
                    return Err(ConfigError::Validation(format!(
                        "stop_bits must be 1 or 2, got {}",
                        stop_bits
                    )));
                }
            }
        }

        self.register_set().map(|_| ())
    }

    /// Build the register set, falling back to
    /// [`RegisterSet::default_temperature_probes`] when none are configured.
    pub fn register_set(&self) -> Result<RegisterSet, ConfigError> {
        if self.registers.is_empty() {
            return Ok(RegisterSet::default_temperature_probes());
        }

        let specs = self
            .registers
            .iter()
            .map(|record| record.to_spec(self.lenient_encodings))
            .collect::<Result<Vec<_>, _>>()?;

        RegisterSet::new(specs).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}
