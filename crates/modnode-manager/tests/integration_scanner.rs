//! Integration tests for the bus scanner against a simulated bus
//!
//! Run with: cargo test --package modnode-manager --test integration_scanner

use modnode_core::{BusAddress, ModuleKind};
use modnode_hardware::mock::{MockBus, MockBusHandle};
use modnode_hardware::{BatteryMonitor, DriverContext, SharedBus, bus};
use modnode_manager::{
    AddressMapping, BusScanner, LifecycleManager, ScannerConfig, ScannerState,
};
use modnode_storage::ModuleRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn addr(raw: u8) -> BusAddress {
    BusAddress::new(raw).unwrap()
}

struct Node {
    manager: Arc<LifecycleManager<MockBus>>,
    bus: SharedBus<MockBus>,
    handle: MockBusHandle,
}

async fn node() -> Node {
    let (mock, handle) = MockBus::new();
    let bus = bus::shared(mock);
    let ctx = DriverContext::new(bus.clone(), BatteryMonitor::unavailable());
    let registry = ModuleRegistry::in_memory().await;
    let (manager, _feed) = LifecycleManager::new(ctx, registry, AddressMapping::default());
    Node {
        manager: Arc::new(manager),
        bus,
        handle,
    }
}

impl Node {
    fn scanner(&self) -> BusScanner<MockBus> {
        BusScanner::new(
            Arc::clone(&self.manager),
            self.bus.clone(),
            ScannerConfig::default(),
        )
    }
}

#[tokio::test]
async fn test_attach_creates_mapped_modules() {
    let node = node().await;
    node.handle.attach(addr(0x48), vec![]);
    node.handle.attach(addr(0x4c), vec![0x80]);

    let mut scanner = node.scanner();
    let report = scanner.scan_once().await.unwrap();

    let kinds: Vec<_> = report.created.iter().map(|info| info.kind).collect();
    assert_eq!(kinds, vec![ModuleKind::Relay, ModuleKind::GasSensor]);
    assert_eq!(scanner.known_addresses(), BTreeSet::from([addr(0x48), addr(0x4c)]));
    assert_eq!(scanner.state(), ScannerState::Idle);

    // Relay is driven off on creation.
    assert_eq!(node.handle.writes(addr(0x48)), vec![vec![0x50, 0x00]]);
}

#[tokio::test]
async fn test_one_create_and_one_remove_per_change() {
    let node = node().await;
    node.handle.attach(addr(0x48), vec![]);
    node.handle.attach(addr(0x49), vec![]);

    let mut scanner = node.scanner();
    scanner.scan_once().await.unwrap();

    node.handle.detach(addr(0x48));
    node.handle.attach(addr(0x4f), vec![0x19, 0x00]);
    let report = scanner.scan_once().await.unwrap();

    assert_eq!(report.removed, vec![addr(0x48)]);
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].address, addr(0x4f));
    assert_eq!(
        node.manager.live_addresses().await,
        BTreeSet::from([addr(0x49), addr(0x4f)])
    );

    // A quiet bus changes nothing.
    let report = scanner.scan_once().await.unwrap();
    assert!(report.created.is_empty());
    assert!(report.removed.is_empty());
}

#[tokio::test]
async fn test_unmapped_device_identified_once() {
    let node = node().await;
    node.handle.attach(addr(0x21), vec![0x7e]);

    let mut scanner = node.scanner();
    let report = scanner.scan_once().await.unwrap();
    assert_eq!(report.identified.len(), 1);
    assert_eq!(report.identified[0].first_byte, 0x7e);
    assert!(report.created.is_empty());
    assert!(scanner.known_addresses().contains(&addr(0x21)));

    let report = scanner.scan_once().await.unwrap();
    assert!(report.identified.is_empty());
    assert!(node.manager.modules().await.is_empty());
}

#[tokio::test]
async fn test_existing_module_counts_as_known() {
    let node = node().await;
    node.manager.add_mapping(addr(0x50), ModuleKind::Relay);

    let mut scanner = node.scanner();
    scanner.scan_once().await.unwrap();

    // Manually created with a different kind before the device shows up.
    node.manager
        .create_module(ModuleKind::Led, addr(0x50))
        .await
        .unwrap();
    node.handle.attach(addr(0x50), vec![]);

    let report = scanner.scan_once().await.unwrap();
    assert!(report.created.is_empty());
    assert!(report.pending.is_empty());
    assert!(scanner.known_addresses().contains(&addr(0x50)));

    let modules = node.manager.modules().await;
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].kind, ModuleKind::Led);
}

#[tokio::test]
async fn test_restored_module_without_hardware_removed() {
    let node = node().await;
    node.manager
        .create_module(ModuleKind::Led, addr(0x49))
        .await
        .unwrap();

    let mut scanner = node.scanner();
    let report = scanner.scan_once().await.unwrap();

    assert_eq!(report.removed, vec![addr(0x49)]);
    assert!(node.manager.modules().await.is_empty());
}

#[tokio::test]
async fn test_failed_create_retried_next_scan() {
    let node = node().await;
    node.handle.attach(addr(0x48), vec![]);
    node.handle.set_faulty(addr(0x48), true);

    let mut scanner = node.scanner();
    let report = scanner.scan_once().await.unwrap();
    assert_eq!(report.present, vec![addr(0x48)]);
    assert_eq!(report.pending, vec![addr(0x48)]);
    assert!(report.created.is_empty());
    assert!(!scanner.known_addresses().contains(&addr(0x48)));
    assert!(node.manager.modules().await.is_empty());

    node.handle.set_faulty(addr(0x48), false);
    let report = scanner.scan_once().await.unwrap();
    assert!(report.pending.is_empty());
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].kind, ModuleKind::Relay);
    assert!(scanner.known_addresses().contains(&addr(0x48)));
    assert_eq!(node.handle.writes(addr(0x48)), vec![vec![0x50, 0x00]]);
}

#[tokio::test]
async fn test_failed_scan_keeps_known_set() {
    let node = node().await;
    node.handle.attach(addr(0x49), vec![]);

    let mut scanner = node.scanner();
    scanner.scan_once().await.unwrap();

    node.handle.fail_scan(true);
    assert!(scanner.scan_once().await.is_err());
    assert_eq!(scanner.known_addresses(), BTreeSet::from([addr(0x49)]));
    assert_eq!(node.manager.modules().await.len(), 1);

    node.handle.fail_scan(false);
    let report = scanner.scan_once().await.unwrap();
    assert!(report.removed.is_empty());
}

#[tokio::test]
async fn test_enumerate_bus_leaves_modules_alone() {
    let node = node().await;
    node.handle.attach(addr(0x48), vec![]);

    let scanner = node.scanner();
    assert_eq!(scanner.enumerate_bus().await.unwrap(), vec![addr(0x48)]);
    assert!(node.manager.modules().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_scans_on_interval_until_shutdown() {
    let node = node().await;
    node.handle.attach(addr(0x4c), vec![0x10]);

    let scanner = BusScanner::new(
        Arc::clone(&node.manager),
        node.bus.clone(),
        ScannerConfig::default().interval(Duration::from_millis(200)),
    );
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scanner.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(node.manager.modules().await.len(), 1);
    assert!(node.handle.scan_count() >= 3);

    node.handle.detach(addr(0x4c));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(node.manager.modules().await.is_empty());

    shutdown.cancel();
    task.await.unwrap();
}
