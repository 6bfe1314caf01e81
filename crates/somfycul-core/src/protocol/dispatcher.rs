//! Throttled, exclusive write path
//!
//! All writes on one connection go through its gate. Holding the gate covers
//! the throttle check, the wait, the write and the timestamp update, so
//! writes never interleave and completed writes are always at least
//! [`MIN_COMMAND_SPACING`](super::MIN_COMMAND_SPACING) apart.

use std::io::{self, Write};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::connection::ConnectionHandle;
use super::CulError;

/// Run a blocking write without stalling other tasks on a multi-threaded runtime
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

fn write_line(output: &mut (dyn Write + Send), message: &str) -> io::Result<()> {
    let mut line = Vec::with_capacity(message.len() + 1);
    line.extend_from_slice(message.as_bytes());
    line.push(b'\n');
    output.write_all(&line)?;
    output.flush()
}

impl ConnectionHandle {
    /// Send one line to the stick.
    ///
    /// Returns `true` once the line has been written and flushed. Failures
    /// are logged; the connection stays open either way.
    pub async fn send(&self, message: &str) -> bool {
        self.send_with_cancel(message, &self.shutdown).await
    }

    /// Like [`send`](Self::send), but gives up without writing if `cancel`
    /// fires while waiting for the throttle
    pub async fn send_with_cancel(&self, message: &str, cancel: &CancellationToken) -> bool {
        match self.try_send(message, cancel).await {
            Ok(()) => true,
            Err(e @ CulError::Cancelled { .. }) => {
                debug!("{}", e);
                false
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Send one line, reporting why it failed
    pub async fn try_send(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CulError> {
        debug!("Trying to write '{}' to serial port {}", message, self.port_name);
        let mut link = self.link.lock().await;

        if link.output.is_none() || self.shutdown.is_cancelled() {
            return Err(CulError::Closed(self.port_name.clone()));
        }

        if let Some(last) = link.last_send {
            let earliest = last + self.spacing;
            if Instant::now() < earliest {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(self.cancelled(message));
                    }
                    _ = self.shutdown.cancelled() => {
                        return Err(self.cancelled(message));
                    }
                    _ = sleep_until(earliest) => {}
                }
            }
        }

        let output = link
            .output
            .as_mut()
            .ok_or_else(|| CulError::Closed(self.port_name.clone()))?;

        run_blocking(|| write_line(&mut **output, message)).map_err(|source| {
            CulError::Write {
                message: message.to_string(),
                port: self.port_name.clone(),
                source,
            }
        })?;

        link.last_send = Some(Instant::now());
        Ok(())
    }

    fn cancelled(&self, message: &str) -> CulError {
        CulError::Cancelled {
            message: message.to_string(),
            port: self.port_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::protocol::{ConnectionManager, MemoryTransport, MIN_COMMAND_SPACING};
    use std::sync::Arc;
    use std::time::Duration;

    fn open(transport: &MemoryTransport) -> ConnectionHandle {
        ConnectionManager::new(Arc::new(transport.clone()))
            .open(&DeviceConfig::new("COM3", 9600))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_send_is_immediate() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = open(&transport);
        let start = Instant::now();

        assert!(handle.send("YsA1100myRollingmyAddr").await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(transport.received(), b"YsA1100myRollingmyAddr\n".to_vec());
        assert_eq!(handle.last_send().await, Some(start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_waits_out_spacing() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = open(&transport);
        let t0 = Instant::now();

        assert!(handle.send("YsA1100myRollingmyAddr").await);
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(handle.send("YsA1100myRollingmyAddr").await);

        assert_eq!(t0.elapsed(), MIN_COMMAND_SPACING);
        let writes = transport.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].at - writes[0].at, MIN_COMMAND_SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_spacing_elapsed() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = open(&transport);

        assert!(handle.send("a").await);
        tokio::time::advance(Duration::from_millis(250)).await;
        let before = Instant::now();
        assert!(handle.send("b").await);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_writes_nothing() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = Arc::new(open(&transport));
        assert!(handle.send("first").await);
        let first_sent = handle.last_send().await;

        let cancel = CancellationToken::new();
        let task = {
            let handle = Arc::clone(&handle);
            let cancel = cancel.clone();
            tokio::spawn(async move { handle.send_with_cancel("second", &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert!(!task.await.unwrap());
        assert_eq!(transport.writes().len(), 1);
        assert_eq!(handle.last_send().await, first_sent);

        // The gate was released.
        assert!(handle.send("third").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_close_fails() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = open(&transport);
        handle.close().await;

        let err = handle
            .try_send("late", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CulError::Closed(port) if port == "COM3"));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_throttled_send() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = Arc::new(open(&transport));
        assert!(handle.send("first").await);

        let task = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.send("second").await })
        };
        tokio::task::yield_now().await;
        handle.close().await;

        assert!(!task.await.unwrap());
        assert_eq!(transport.writes().len(), 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_names_message_and_port() {
        let transport = MemoryTransport::with_ports(["COM3"]);
        let handle = open(&transport);
        transport.fail_next_writes(1);

        let err = handle
            .try_send("YsA1200AB12", &CancellationToken::new())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("YsA1200AB12"));
        assert!(text.contains("COM3"));
        assert_eq!(handle.last_send().await, None);
    }
}
