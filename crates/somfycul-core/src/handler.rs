//! CUL stick handler
//!
//! Glue between a host and one stick: validates configuration, owns the
//! connection, maps failures to status updates and turns Somfy commands into
//! throttled writes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use crate::config::CulConfig;
use crate::protocol::{
    ConnectionHandle, ConnectionManager, CulCommand, CulError, SomfyCommand, Transport,
};
use crate::status::{ConnectionState, StatusDetail, StatusReporter};

/// Drives one CUL stick on behalf of a host
///
/// Holds at most one open connection. All methods take `&self`, so a handler
/// can be shared behind an [`Arc`] between tasks.
pub struct CulHandler {
    config: CulConfig,
    manager: ConnectionManager,
    reporter: Arc<dyn StatusReporter>,
    state: Mutex<ConnectionState>,
    connection: Mutex<Option<Arc<ConnectionHandle>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CulHandler {
    /// Handler for `config`; nothing is opened until [`initialize`](Self::initialize)
    pub fn new(
        config: CulConfig,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            config,
            manager: ConnectionManager::new(transport),
            reporter,
            state: Mutex::new(ConnectionState::Uninitialized),
            connection: Mutex::new(None),
        }
    }

    /// Configuration as supplied by the host
    pub fn config(&self) -> &CulConfig {
        &self.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.state).clone()
    }

    /// The open connection, if initialization succeeded
    pub fn connection(&self) -> Option<Arc<ConnectionHandle>> {
        lock(&self.connection).clone()
    }

    /// Validate the configuration and open the port.
    ///
    /// Reports `Online` on success and `Offline` with the cause otherwise.
    /// A connection left over from an earlier call is closed first.
    pub async fn initialize(&self) -> Result<(), CulError> {
        debug!("Start initializing!");
        self.close_connection().await;

        let opened = self.config.validate().and_then(|device| {
            info!("got port: {}", device.port());
            self.manager.open(&device)
        });

        match opened {
            Ok(handle) => {
                *lock(&self.connection) = Some(Arc::new(handle));
                self.set_state(ConnectionState::Online);
                debug!("Finished initializing!");
                Ok(())
            }
            Err(e) => {
                let detail = e
                    .status_detail()
                    .unwrap_or(StatusDetail::CommunicationError);
                if detail == StatusDetail::CommunicationError {
                    error!("Failed to initialize CUL stick: {}", e);
                }
                self.set_state(ConnectionState::offline(detail, e.to_string()));
                Err(e)
            }
        }
    }

    /// Send `command` to the actuator at `address`.
    ///
    /// The rolling code is used as given; keeping it increasing is up to the
    /// caller. Returns `true` if the stick accepted the line.
    pub async fn execute_command(
        &self,
        target_label: &str,
        command: SomfyCommand,
        rolling_code: &str,
        address: &str,
    ) -> bool {
        let cul_command = CulCommand::new(command, rolling_code, address).encode();
        info!("Send message {} for thing {}", cul_command, target_label);
        self.send_line(&cul_command).await
    }

    /// Write an already encoded line through the throttled write path
    pub async fn send_line(&self, line: &str) -> bool {
        match self.connection() {
            Some(connection) => connection.send(line).await,
            None => {
                error!("Cannot send '{}': {}", line, CulError::NotInitialized);
                false
            }
        }
    }

    /// Close the port and return to `Uninitialized`
    pub async fn dispose(&self) {
        self.close_connection().await;
        *lock(&self.state) = ConnectionState::Uninitialized;
    }

    async fn close_connection(&self) {
        let previous = lock(&self.connection).take();
        if let Some(connection) = previous {
            connection.close().await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state.clone();
        self.reporter.update_status(&state);
    }
}
