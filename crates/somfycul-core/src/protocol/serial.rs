//! Serial port handling
//!
//! [`Transport`] implementation backed by the `serialport` crate.

use serialport::{FlowControl, SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

use super::transport::{LineSettings, PortId, SerialLink, Transport};
use super::{PortRegistry, DEFAULT_BAUD_RATE, WRITE_TIMEOUT};

/// USB vendor ID of the Atmel/LUFA firmware busware sticks ship with
pub const CUL_USB_VID: u16 = 0x03EB;

/// USB product ID of a CUL stick
pub const CUL_USB_PID: u16 = 0x204B;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn named(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }

    /// Whether the USB IDs match a busware CUL stick
    pub fn looks_like_cul(&self) -> bool {
        self.vid == Some(CUL_USB_VID) && self.pid == Some(CUL_USB_PID)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Listing rank of a port, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PortFamily {
    /// USB IDs identify a CUL stick
    Cul,
    /// CDC ACM node, numbered
    Acm(u32),
    /// USB serial adapter node, numbered
    UsbSerial(u32),
    Other,
}

impl PortInfo {
    fn family(&self) -> PortFamily {
        if self.looks_like_cul() {
            return PortFamily::Cul;
        }
        let node = self.name.rsplit('/').next().unwrap_or(&self.name);
        let number = |prefix: &str| {
            node.strip_prefix(prefix)
                .map(|n| n.parse::<u32>().unwrap_or(u32::MAX))
        };
        if let Some(n) = number("ttyACM") {
            PortFamily::Acm(n)
        } else if let Some(n) = number("ttyUSB") {
            PortFamily::UsbSerial(n)
        } else {
            PortFamily::Other
        }
    }
}

/// Order ports so a likely stick comes first and the order is stable
fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by(|a, b| {
        a.family()
            .cmp(&b.family())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// ttyACM and ttyUSB nodes present under /dev
#[cfg(target_os = "linux")]
fn dev_nodes() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
        .map(|name| format!("/dev/{name}"))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn dev_nodes() -> Vec<String> {
    Vec::new()
}

/// List visible serial ports, CUL sticks first
///
/// Device nodes udev has not announced yet are listed too, without USB details.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: BTreeMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let port = PortInfo::from(info);
            (port.name.clone(), port)
        })
        .collect();
    for node in dev_nodes() {
        if !ports.contains_key(&node) {
            debug!("Listing {} found under /dev only", node);
            ports.insert(node.clone(), PortInfo::named(node));
        }
    }

    let mut ports: Vec<PortInfo> = ports.into_values().collect();
    sort_ports(&mut ports);
    ports
}

#[cfg(unix)]
fn device_node_exists(name: &str) -> bool {
    std::path::Path::new(name).exists()
}

#[cfg(not(unix))]
fn device_node_exists(_name: &str) -> bool {
    false
}

/// Transport over the host's real serial ports
#[derive(Debug, Clone, Copy)]
pub struct SerialPortTransport {
    registry: &'static PortRegistry,
}

impl SerialPortTransport {
    /// Transport consulting the process-wide [`PortRegistry`]
    pub fn new() -> Self {
        Self {
            registry: PortRegistry::global(),
        }
    }
}

impl Default for SerialPortTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialPortTransport {
    fn available_ports(&self) -> Vec<String> {
        list_ports().into_iter().map(|p| p.name).collect()
    }

    fn resolve(&self, name: &str) -> Option<PortId> {
        if list_ports().iter().any(|p| p.name == name) {
            return Some(PortId::new(name));
        }
        if self.registry.contains(name) && device_node_exists(name) {
            debug!("Resolved registered port {} outside enumeration", name);
            return Some(PortId::new(name));
        }
        None
    }

    fn open(
        &self,
        port: &PortId,
        owner: &str,
        timeout: Duration,
    ) -> io::Result<Box<dyn SerialLink>> {
        debug!(
            "Opening {} for {} (acquisition timeout {}ms)",
            port,
            owner,
            timeout.as_millis()
        );
        // The builder timeout bounds every read and write on the port.
        let builder = serialport::new(port.name(), DEFAULT_BAUD_RATE).timeout(WRITE_TIMEOUT);

        #[cfg(unix)]
        let port: Box<dyn SerialPort> = {
            let mut native = builder.open_native()?;
            native.set_exclusive(true)?;
            Box::new(native)
        };
        // COM ports are always opened exclusively
        #[cfg(not(unix))]
        let port: Box<dyn SerialPort> = builder.open()?;

        Ok(Box::new(SerialPortLink { port: Some(port) }))
    }
}

/// An open `serialport` handle
struct SerialPortLink {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))
    }

    fn stream(&mut self) -> io::Result<PortStream> {
        let clone = self.port()?.try_clone()?;
        Ok(PortStream { port: clone })
    }
}

impl SerialLink for SerialPortLink {
    fn configure(&mut self, settings: &LineSettings) -> io::Result<()> {
        let port = self.port()?;
        port.set_baud_rate(settings.baud_rate)?;
        port.set_data_bits(settings.data_bits)?;
        port.set_stop_bits(settings.stop_bits)?;
        port.set_parity(settings.parity)?;
        port.set_flow_control(FlowControl::None)?;
        Ok(())
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.stream()?))
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.stream()?))
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the last handle closes the file descriptor.
        self.port = None;
        Ok(())
    }
}

/// One cloned handle of the port, used as a byte stream
struct PortStream {
    port: Box<dyn SerialPort>,
}

impl Read for PortStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for PortStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
