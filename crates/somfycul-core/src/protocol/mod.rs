//! CUL stick communication
//!
//! Encodes Somfy RTS commands for the CUL firmware and writes them to the
//! stick over a serial line, one command every [`MIN_COMMAND_SPACING`].

pub mod commands;
mod connection;
mod dispatcher;
mod error;
pub mod memory;
pub mod registry;
pub mod serial;
pub mod transport;

pub use commands::{encode, CulCommand, SomfyCommand};
pub use connection::{ConnectionHandle, ConnectionManager};
pub use error::CulError;
pub use memory::{LinkEvent, MemoryTransport, RecordedWrite};
pub use registry::PortRegistry;
pub use serial::{list_ports, PortInfo, SerialPortTransport};
pub use transport::{LineSettings, PortId, SerialLink, Transport};

use std::time::Duration;

/// Default baud rate of a CUL stick
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Minimum gap between two completed writes to the stick
pub const MIN_COMMAND_SPACING: Duration = Duration::from_millis(100);

/// How long `open` may wait to acquire the port
pub const OPEN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound for a single blocking write on a real port
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Owner tag passed to the transport when a port is acquired
pub const OWNER_TAG: &str = "somfycul";
