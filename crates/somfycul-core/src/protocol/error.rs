//! Driver errors

use std::io;
use thiserror::Error;

use crate::status::StatusDetail;

/// Errors that can occur while talking to a CUL stick
#[derive(Error, Debug)]
pub enum CulError {
    /// Configuration is missing or invalid
    #[error("{0}")]
    Configuration(String),

    #[error(
        "Serial port '{port}' could not be found. Available ports are:\n{}",
        port_list(.available)
    )]
    PortNotFound {
        /// Configured port name
        port: String,
        /// Every port visible when the open failed
        available: Vec<String>,
    },

    /// Opening or configuring the port failed
    #[error("An error occurred while initializing the CUL connection: {0}")]
    Communication(String),

    /// A line could not be written or flushed
    #[error("Error writing '{message}' to serial port {port}: {source}")]
    Write {
        /// Line that was being sent
        message: String,
        /// Port it was sent to
        port: String,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// The throttle wait was cancelled before the write
    #[error("Sending '{message}' to serial port {port} was cancelled")]
    Cancelled {
        /// Line that was not sent
        message: String,
        /// Port it was meant for
        port: String,
    },

    /// The connection has been closed
    #[error("Serial port {0} is closed")]
    Closed(String),

    /// No connection has been opened yet
    #[error("CUL stick is not initialized")]
    NotInitialized,

    /// Command name does not match any RTS control code
    #[error("Unknown Somfy command: {0}")]
    UnknownCommand(String),

    /// Configuration document is not valid JSON
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// Reading configuration or another local resource failed
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl CulError {
    /// Status detail reported to the host when this error takes the stick offline.
    ///
    /// Only connection-level failures map to a detail; write failures and
    /// cancellations stay local to the caller.
    pub fn status_detail(&self) -> Option<StatusDetail> {
        match self {
            CulError::Configuration(_) | CulError::InvalidConfig(_) => {
                Some(StatusDetail::ConfigurationError)
            }
            CulError::PortNotFound { .. } | CulError::Communication(_) | CulError::IoError(_) => {
                Some(StatusDetail::CommunicationError)
            }
            _ => None,
        }
    }
}

fn port_list(ports: &[String]) -> String {
    ports.iter().map(|p| format!("{p}\n")).collect()
}
