use pretty_assertions::assert_eq;
use somfycul_core::prelude::*;
use somfycul_core::protocol::MIN_COMMAND_SPACING;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn open(transport: &MemoryTransport, port: &str) -> Arc<ConnectionHandle> {
    let manager = ConnectionManager::new(Arc::new(transport.clone()));
    let device = CulConfig::new(port, 9600).validate().unwrap();
    Arc::new(manager.open(&device).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_scenario_send_at_50ms_waits_until_100ms() {
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");
    let t0 = Instant::now();

    assert!(handle.send("YsA1100myRollingmyAddr").await);
    assert_eq!(t0.elapsed(), Duration::ZERO);

    tokio::time::advance(Duration::from_millis(50)).await;
    assert!(handle.send("YsA1100myRollingmyAddr").await);
    assert_eq!(t0.elapsed(), Duration::from_millis(100));

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].at, t0);
    assert_eq!(writes[1].at, t0 + Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sends_are_serialized_and_spaced() {
    const SENDERS: usize = 8;
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");

    let tasks: Vec<_> = (0..SENDERS)
        .map(|i| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.send(&format!("YsA1{}0000{i}ABCDEF", i % 9)).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    let writes = transport.writes();
    assert_eq!(writes.len(), SENDERS);
    for pair in writes.windows(2) {
        assert!(pair[1].at - pair[0].at >= MIN_COMMAND_SPACING);
    }

    // Every line arrives whole, in the order the senders queued up.
    let expected: Vec<String> = (0..SENDERS)
        .map(|i| format!("YsA1{}0000{i}ABCDEF\n", i % 9))
        .collect();
    let lines: Vec<String> = writes.iter().map(|w| w.text()).collect();
    assert_eq!(lines, expected);
    assert_eq!(transport.received(), expected.concat().into_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_on_multi_thread_runtime() {
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.send(&format!("line{i}")).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    let writes = transport.writes();
    assert_eq!(writes.len(), 4);
    let mut lines: Vec<String> = writes.iter().map(|w| w.text()).collect();
    lines.sort();
    assert_eq!(lines, vec!["line0\n", "line1\n", "line2\n", "line3\n"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_does_not_advance_throttle() {
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");
    let t0 = Instant::now();

    assert!(handle.send("first").await);
    tokio::time::advance(Duration::from_millis(100)).await;

    transport.fail_next_writes(1);
    assert!(!handle.send("lost").await);
    assert_eq!(handle.last_send().await, Some(t0));

    // Throttled against the first write, not the failed attempt.
    let before = Instant::now();
    assert!(handle.send("second").await);
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(t0.elapsed(), Duration::from_millis(100));

    let lines: Vec<String> = transport.writes().iter().map(|w| w.text()).collect();
    assert_eq!(lines, vec!["first\n", "second\n"]);
    assert!(!handle.is_closed());
}

#[test]
fn test_port_not_found_lists_available_ports() {
    let transport = MemoryTransport::with_ports(["COM1", "COM2"]);
    let manager = ConnectionManager::new(Arc::new(transport.clone()));

    let err = match manager.open(&DeviceConfig::new("COM99", 9600)) {
        Err(e) => e,
        Ok(_) => panic!("COM99 should not resolve"),
    };
    let message = err.to_string();
    assert!(message.contains("COM99"));
    assert!(message.contains("COM1"));
    assert!(message.contains("COM2"));
    assert_eq!(err.status_detail(), Some(StatusDetail::CommunicationError));
    assert!(somfycul_core::protocol::PortRegistry::global().contains("COM99"));
}

#[tokio::test(start_paused = true)]
async fn test_close_twice_is_noop() {
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");
    assert!(handle.send("YsA1100001ABCDEF").await);

    handle.close().await;
    handle.close().await;
    assert_eq!(transport.close_count(), 1);
    assert!(!handle.send("YsA1100002ABCDEF").await);
    assert_eq!(transport.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_queued_senders() {
    let transport = MemoryTransport::with_ports(["COM3"]);
    let handle = open(&transport, "COM3");
    assert!(handle.send("first").await);

    let queued: Vec<_> = (0..3)
        .map(|i| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.send(&format!("queued{i}")).await })
        })
        .collect();
    tokio::task::yield_now().await;
    handle.close().await;

    for task in queued {
        assert!(!task.await.unwrap());
    }
    assert_eq!(transport.writes().len(), 1);
    assert!(!transport.is_open("COM3"));
}
