//! Transport abstraction
//!
//! The seam between the driver and the platform's serial layer. The driver
//! only ever resolves, opens, configures and tears down ports through these
//! traits, so it runs unchanged against real hardware or in memory.

use serialport::{DataBits, Parity, StopBits};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A port name the transport has confirmed it can open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortId {
    name: String,
}

impl PortId {
    /// Wrap a resolved port name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The port name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Line format applied right after a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Line speed
    pub baud_rate: u32,
    /// Bits per character
    pub data_bits: DataBits,
    /// Stop bits per character
    pub stop_bits: StopBits,
    /// Parity checking
    pub parity: Parity,
}

impl LineSettings {
    /// Standard 8N1 format the CUL firmware uses, at the given baud rate
    pub fn cul(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Platform serial layer
pub trait Transport: Send + Sync {
    /// Names of every serial port currently visible
    fn available_ports(&self) -> Vec<String>;

    /// Resolve a port name, or `None` if the transport does not know it
    fn resolve(&self, name: &str) -> Option<PortId>;

    /// Acquire the port exclusively on behalf of `owner`
    fn open(&self, port: &PortId, owner: &str, timeout: Duration)
        -> io::Result<Box<dyn SerialLink>>;
}

/// An opened port
pub trait SerialLink: Send {
    /// Apply baud rate and line format
    fn configure(&mut self, settings: &LineSettings) -> io::Result<()>;

    /// Byte stream from the stick
    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Byte stream to the stick
    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>>;

    /// Drop any data-available listener attached to the port
    fn remove_event_listener(&mut self) {}

    /// Release the port
    fn close(&mut self) -> io::Result<()>;
}
