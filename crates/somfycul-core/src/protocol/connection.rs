//! Connection management
//!
//! Acquires and releases the stick's serial port.

use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{LineSettings, SerialLink, Transport};
use super::{CulError, PortRegistry, MIN_COMMAND_SPACING, OPEN_TIMEOUT, OWNER_TAG};
use crate::config::DeviceConfig;

/// Everything guarded by a connection's send gate
pub(super) struct Link {
    pub(super) port: Option<Box<dyn SerialLink>>,
    pub(super) input: Option<Box<dyn Read + Send>>,
    pub(super) output: Option<Box<dyn Write + Send>>,
    /// Completion time of the last successful write
    pub(super) last_send: Option<Instant>,
}

impl Link {
    /// Release every resource, each step independent of the others
    fn teardown(&mut self, port_name: &str) {
        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.flush() {
                debug!("Ignoring flush error on {} during close: {}", port_name, e);
            }
            drop(output);
        }
        drop(self.input.take());
        if let Some(mut port) = self.port.take() {
            port.remove_event_listener();
            if let Err(e) = port.close() {
                debug!("Ignoring close error on {}: {}", port_name, e);
            }
            info!("Closed serial port {}", port_name);
        }
    }
}

/// An open, exclusively owned port plus its send state
///
/// Share it behind an [`Arc`]; [`send`](ConnectionHandle::send) may be called
/// from any number of tasks at once.
pub struct ConnectionHandle {
    pub(super) port_name: String,
    pub(super) spacing: std::time::Duration,
    pub(super) link: Mutex<Link>,
    /// Cancelled once `close` starts
    pub(super) shutdown: CancellationToken,
}

impl ConnectionHandle {
    fn new(
        port_name: String,
        port: Box<dyn SerialLink>,
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            port_name,
            spacing: MIN_COMMAND_SPACING,
            link: Mutex::new(Link {
                port: Some(port),
                input: Some(input),
                output: Some(output),
                last_send: None,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Name of the underlying serial port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completion time of the last successful write, if any
    pub async fn last_send(&self) -> Option<Instant> {
        self.link.lock().await.last_send
    }

    /// Close the connection. Best-effort and idempotent.
    ///
    /// Pending throttle waits are cancelled first; a write already on the
    /// wire finishes before the port is released.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let mut link = self.link.lock().await;
        link.teardown(&self.port_name);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.link.get_mut().teardown(&self.port_name);
    }
}

/// Opens connections to CUL sticks through a [`Transport`]
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    registry: &'static PortRegistry,
}

impl ConnectionManager {
    /// Manager registering ports in the process-wide [`PortRegistry`]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: PortRegistry::global(),
        }
    }

    /// Transport used to resolve and open ports
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Open the configured port exclusively and apply 8N1 at the configured baud rate
    pub fn open(&self, config: &DeviceConfig) -> Result<ConnectionHandle, CulError> {
        let name = config.port();
        if self.registry.add(name) {
            debug!(
                "Added {} to the serial port allow-list ({})",
                name,
                self.registry.to_property_string()
            );
        }

        let id = self
            .transport
            .resolve(name)
            .ok_or_else(|| CulError::PortNotFound {
                port: name.to_string(),
                available: self.transport.available_ports(),
            })?;

        let mut port = self
            .transport
            .open(&id, OWNER_TAG, OPEN_TIMEOUT)
            .map_err(|e| CulError::Communication(e.to_string()))?;

        let streams = port
            .configure(&LineSettings::cul(config.baud_rate()))
            .and_then(|()| Ok((port.input_stream()?, port.output_stream()?)));

        match streams {
            Ok((input, output)) => {
                info!("Opened serial port {} at {} baud", name, config.baud_rate());
                Ok(ConnectionHandle::new(name.to_string(), port, input, output))
            }
            Err(e) => {
                warn!("Failed to set up serial port {}: {}", name, e);
                port.remove_event_listener();
                let _ = port.close();
                Err(CulError::Communication(e.to_string()))
            }
        }
    }
}
