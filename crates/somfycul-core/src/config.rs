//! CUL stick configuration
//!
//! Host configuration is read as JSON:
//!
//! ```json
//! { "port": "/dev/ttyACM0", "baudrate": 9600 }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::protocol::{CulError, DEFAULT_BAUD_RATE};

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Configuration as supplied by the host, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CulConfig {
    /// Serial port the stick is attached to
    #[serde(default)]
    pub port: Option<String>,
    /// Line speed, 9600 when absent
    #[serde(default = "default_baud_rate")]
    pub baudrate: u32,
}

impl Default for CulConfig {
    fn default() -> Self {
        Self {
            port: None,
            baudrate: DEFAULT_BAUD_RATE,
        }
    }
}

impl CulConfig {
    /// Configuration for `port` at `baudrate`
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: Some(port.into()),
            baudrate,
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, CulError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CulError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check the configuration and freeze it
    pub fn validate(&self) -> Result<DeviceConfig, CulError> {
        let port = match self.port.as_deref().map(str::trim) {
            Some(port) if !port.is_empty() => port,
            _ => return Err(CulError::Configuration("Port must be set!".to_string())),
        };
        if self.baudrate == 0 {
            return Err(CulError::Configuration(
                "Baud rate must be greater than zero!".to_string(),
            ));
        }
        Ok(DeviceConfig::new(port, self.baudrate))
    }
}

/// Validated, immutable connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    port: String,
    baud_rate: u32,
}

impl DeviceConfig {
    /// Parameters taken as given, without validation
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    /// Serial port name
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Line speed in baud
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
