//! # SomfyCUL Core Library
//!
//! Drives Somfy RTS roller shutters and awnings through a CUL radio stick.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Encoding of Somfy RTS commands into CUL `Ys` lines
//! - Exclusive serial port acquisition and best-effort teardown
//! - A throttled write path keeping commands 100ms apart
//! - Status reporting for the hosting application
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use somfycul_core::prelude::*;
//!
//! let handler = CulHandler::new(
//!     CulConfig::new("/dev/ttyACM0", 9600),
//!     Arc::new(SerialPortTransport::new()),
//!     Arc::new(LogStatusReporter),
//! );
//! handler.initialize().await?;
//! handler.execute_command("Living room", SomfyCommand::Down, "0001", "1A2B3C").await;
//! handler.dispose().await;
//! ```

pub mod config;
pub mod handler;
pub mod protocol;
pub mod status;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CulConfig, DeviceConfig};
    pub use crate::handler::CulHandler;
    pub use crate::protocol::{
        encode, ConnectionHandle, ConnectionManager, CulCommand, CulError, MemoryTransport,
        SerialPortTransport, SomfyCommand, Transport,
    };
    pub use crate::status::{
        ConnectionState, LogStatusReporter, RecordingStatusReporter, StatusDetail, StatusReporter,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
