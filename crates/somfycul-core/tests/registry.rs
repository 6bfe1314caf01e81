use pretty_assertions::assert_eq;
use somfycul_core::prelude::*;
use somfycul_core::protocol::PortRegistry;
use std::sync::Arc;

const PREFIX: &str = "/dev/cul-registry-";

fn registered() -> Vec<String> {
    PortRegistry::global()
        .names()
        .into_iter()
        .filter(|name| name.starts_with(PREFIX))
        .collect()
}

#[tokio::test]
async fn test_allow_list_accumulates_across_managers_and_reopens() {
    let a = format!("{PREFIX}a");
    let b = format!("{PREFIX}b");
    let transport = MemoryTransport::with_ports([a.as_str(), b.as_str()]);
    let first = ConnectionManager::new(Arc::new(transport.clone()));
    let second = ConnectionManager::new(Arc::new(transport.clone()));

    let handle = first.open(&DeviceConfig::new(a.as_str(), 9600)).unwrap();
    handle.close().await;
    assert_eq!(registered(), vec![a.clone()]);

    let handle = second.open(&DeviceConfig::new(b.as_str(), 9600)).unwrap();
    handle.close().await;
    assert_eq!(registered(), vec![a.clone(), b.clone()]);

    let handle = second.open(&DeviceConfig::new(a.as_str(), 9600)).unwrap();
    handle.close().await;
    assert_eq!(registered(), vec![a.clone(), b.clone()]);
    assert_eq!(transport.open_count(), 3);

    let property = PortRegistry::global().to_property_string();
    assert_eq!(property.matches(a.as_str()).count(), 1);
    assert!(property.contains(b.as_str()));
}

#[tokio::test]
async fn test_failed_open_still_registers_once() {
    let missing = "/dev/cul-absent-stick".to_string();
    let transport = MemoryTransport::with_ports(["COM1"]);
    let manager = ConnectionManager::new(Arc::new(transport));

    for _ in 0..3 {
        let err = manager
            .open(&DeviceConfig::new(missing.as_str(), 9600))
            .err()
            .unwrap();
        assert!(matches!(err, CulError::PortNotFound { .. }));
    }
    let names = PortRegistry::global().names();
    assert_eq!(names.iter().filter(|n| **n == missing).count(), 1);
}
