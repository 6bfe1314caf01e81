//! In-memory transport
//!
//! Simulates a set of serial ports and records every line written to them.
//! Used for dry runs without a stick attached and for tests. Failures can be
//! injected on open, configure, write and flush.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::transport::{LineSettings, PortId, SerialLink, Transport};

/// One flushed write, as the stick would have received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Port the line was written to
    pub port: String,
    /// Bytes of the write, including the line terminator
    pub bytes: Vec<u8>,
    /// Time the flush completed
    pub at: Instant,
}

impl RecordedWrite {
    /// The written bytes as text, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Resource events on a simulated port, in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The output stream was flushed successfully
    OutputFlushed,
    /// The output stream was dropped
    OutputClosed,
    /// The input stream was dropped
    InputClosed,
    /// The event listener was removed
    ListenerRemoved,
    /// The port was released
    PortClosed,
}

#[derive(Debug, Default)]
struct MemoryState {
    ports: Vec<String>,
    open: HashSet<String>,
    open_error: Option<String>,
    configure_error: Option<String>,
    failing_writes: usize,
    flush_error: Option<String>,
    settings: Option<LineSettings>,
    writes: Vec<RecordedWrite>,
    opens: usize,
    closes: usize,
    listeners_removed: usize,
    events: Vec<LinkEvent>,
}

/// Transport over simulated ports. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Transport exposing the given port names
    pub fn with_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Self::default();
        transport.lock().ports = ports.into_iter().map(Into::into).collect();
        transport
    }

    /// Make every following `open` fail with `message`
    pub fn fail_open(&self, message: impl Into<String>) {
        self.lock().open_error = Some(message.into());
    }

    /// Make every following `configure` fail with `message`
    pub fn fail_configure(&self, message: impl Into<String>) {
        self.lock().configure_error = Some(message.into());
    }

    /// Make the next `count` writes fail with a broken pipe
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    /// Make every following `flush` fail with `message`
    pub fn fail_flush(&self, message: impl Into<String>) {
        self.lock().flush_error = Some(message.into());
    }

    /// Stream and port events, oldest first
    pub fn events(&self) -> Vec<LinkEvent> {
        self.lock().events.clone()
    }

    /// All flushed writes, oldest first
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    /// Concatenation of every flushed write
    pub fn received(&self) -> Vec<u8> {
        self.lock()
            .writes
            .iter()
            .flat_map(|w| w.bytes.iter().copied())
            .collect()
    }

    /// Line settings applied by the last `configure`
    pub fn settings(&self) -> Option<LineSettings> {
        self.lock().settings
    }

    /// Whether some link currently holds `port`
    pub fn is_open(&self, port: &str) -> bool {
        self.lock().open.contains(port)
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Number of ports released
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Number of `remove_event_listener` calls
    pub fn listeners_removed(&self) -> usize {
        self.lock().listeners_removed
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for MemoryTransport {
    fn available_ports(&self) -> Vec<String> {
        self.lock().ports.clone()
    }

    fn resolve(&self, name: &str) -> Option<PortId> {
        self.lock()
            .ports
            .iter()
            .any(|p| p == name)
            .then(|| PortId::new(name))
    }

    fn open(
        &self,
        port: &PortId,
        _owner: &str,
        _timeout: Duration,
    ) -> io::Result<Box<dyn SerialLink>> {
        let mut state = self.lock();
        if let Some(message) = &state.open_error {
            return Err(io::Error::other(message.clone()));
        }
        if !state.open.insert(port.name().to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("Port {} is currently in use", port),
            ));
        }
        state.opens += 1;
        Ok(Box::new(MemoryLink {
            port: port.name().to_string(),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MemoryLink {
    port: String,
    state: Arc<Mutex<MemoryState>>,
    closed: bool,
}

impl SerialLink for MemoryLink {
    fn configure(&mut self, settings: &LineSettings) -> io::Result<()> {
        let mut state = lock_state(&self.state);
        if let Some(message) = &state.configure_error {
            return Err(io::Error::other(message.clone()));
        }
        state.settings = Some(*settings);
        Ok(())
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(MemoryReader {
            state: Arc::clone(&self.state),
        }))
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(MemoryWriter {
            port: self.port.clone(),
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        }))
    }

    fn remove_event_listener(&mut self) {
        let mut state = lock_state(&self.state);
        state.listeners_removed += 1;
        state.events.push(LinkEvent::ListenerRemoved);
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            let mut state = lock_state(&self.state);
            state.open.remove(&self.port);
            state.closes += 1;
            state.events.push(LinkEvent::PortClosed);
        }
        Ok(())
    }
}

/// Input side of a simulated port; the stick never answers
struct MemoryReader {
    state: Arc<Mutex<MemoryState>>,
}

impl Read for MemoryReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        lock_state(&self.state).events.push(LinkEvent::InputClosed);
    }
}

/// Buffers bytes until flushed, then records them as one write
struct MemoryWriter {
    port: String,
    state: Arc<Mutex<MemoryState>>,
    pending: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock_state(&self.state);
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            self.pending.clear();
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = lock_state(&self.state);
        if let Some(message) = &state.flush_error {
            return Err(io::Error::other(message.clone()));
        }
        if !self.pending.is_empty() {
            let bytes = std::mem::take(&mut self.pending);
            state.writes.push(RecordedWrite {
                port: self.port.clone(),
                bytes,
                at: Instant::now(),
            });
        }
        state.events.push(LinkEvent::OutputFlushed);
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        lock_state(&self.state).events.push(LinkEvent::OutputClosed);
    }
}
