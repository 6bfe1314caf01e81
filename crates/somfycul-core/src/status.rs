//! Lifecycle status reported to the host

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Why the stick is offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusDetail {
    /// The configuration has to be fixed first
    ConfigurationError,
    /// The port could not be found, opened or configured
    CommunicationError,
}

/// Connection state of a CUL stick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not initialized yet, or disposed
    Uninitialized,
    /// Port open, ready to send
    Online,
    /// Initialization failed
    Offline {
        /// Failure class
        detail: StatusDetail,
        /// Human-readable cause
        message: String,
    },
}

impl ConnectionState {
    /// `Offline` with the given detail and message
    pub fn offline(detail: StatusDetail, message: impl Into<String>) -> Self {
        ConnectionState::Offline {
            detail,
            message: message.into(),
        }
    }

    /// Whether the port is open
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionState::Online)
    }
}

/// Receives every status transition of a stick
pub trait StatusReporter: Send + Sync {
    /// Called once per transition, with the new state
    fn update_status(&self, state: &ConnectionState);
}

/// Logs status transitions
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusReporter;

impl StatusReporter for LogStatusReporter {
    fn update_status(&self, state: &ConnectionState) {
        match state {
            ConnectionState::Offline { detail, message } => {
                warn!("CUL stick offline ({:?}): {}", detail, message)
            }
            other => info!("CUL stick status: {:?}", other),
        }
    }
}

/// Keeps every reported state, oldest first
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    states: Mutex<Vec<ConnectionState>>,
}

impl RecordingStatusReporter {
    /// Reporter with no states recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reported state, oldest first
    pub fn states(&self) -> Vec<ConnectionState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recently reported state
    pub fn last(&self) -> Option<ConnectionState> {
        self.states().pop()
    }
}

impl StatusReporter for RecordingStatusReporter {
    fn update_status(&self, state: &ConnectionState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
    }
}
