//! Integration tests for the lifecycle manager with file-backed storage
//!
//! A temporary state directory is reopened to simulate a node restart.
//!
//! Run with: cargo test --package modnode-manager --test integration_lifecycle

use modnode_core::{BusAddress, Error, ModuleKind};
use modnode_hardware::mock::{MockBus, MockBusHandle};
use modnode_hardware::{BatteryMonitor, DriverContext, bus};
use modnode_manager::{AddressMapping, LifecycleManager, ReportFeed};
use modnode_storage::{DocumentStore, ModuleRegistry, StorageConfig};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn addr(raw: u8) -> BusAddress {
    BusAddress::new(raw).unwrap()
}

/// Addresses where a relay board answers; relays are driven off on creation.
const BOARDS: [u8; 3] = [0x48, 0x49, 0x50];

async fn boot(config: &StorageConfig) -> (LifecycleManager<MockBus>, ReportFeed, MockBusHandle) {
    let (mock, handle) = MockBus::new();
    for raw in BOARDS {
        handle.attach(addr(raw), vec![]);
    }
    let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
    let registry = ModuleRegistry::open(DocumentStore::file(config.registry_path())).await;
    let (manager, feed) = LifecycleManager::new(ctx, registry, AddressMapping::default());
    (manager, feed, handle)
}

#[tokio::test]
async fn test_modules_restored_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());

    let (relay, sensor) = {
        let (manager, _feed, _handle) = boot(&config).await;
        let relay = manager
            .create_module(ModuleKind::Relay, addr(0x48))
            .await
            .unwrap();
        let sensor = manager
            .create_module(ModuleKind::TemperatureSensor, addr(0x4f))
            .await
            .unwrap();
        (relay, sensor)
    };

    let (manager, mut feed, _handle) = boot(&config).await;
    assert_eq!(manager.load_modules().await, 2);

    assert_eq!(manager.get_module(&relay.id).await, Some(relay.clone()));
    assert_eq!(manager.get_module(&sensor.id).await, Some(sensor.clone()));

    // Boot restore is published for the coordinator.
    assert!(feed.has_changed().unwrap());
    assert_eq!(feed.borrow_and_update().len(), 2);
}

#[tokio::test]
async fn test_identity_stable_across_restart_and_reattach() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());

    let first = {
        let (manager, _feed, _handle) = boot(&config).await;
        let info = manager
            .create_module(ModuleKind::Led, addr(0x49))
            .await
            .unwrap();
        manager.remove_module(&info.id).await;
        info
    };

    let (manager, _feed, _handle) = boot(&config).await;
    assert_eq!(manager.load_modules().await, 0);

    let again = manager
        .create_module(ModuleKind::Led, addr(0x49))
        .await
        .unwrap();
    assert_eq!(again.id, first.id);

    // Same address, different kind: a different identity.
    manager.remove_module(&again.id).await;
    let relay = manager
        .create_module(ModuleKind::Relay, addr(0x49))
        .await
        .unwrap();
    assert_ne!(relay.id, first.id);
}

#[tokio::test]
async fn test_stored_module_with_unknown_kind_skipped() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());
    std::fs::write(
        config.registry_path(),
        json!({
            "active_modules": [
                {"uuid": "aaaaaaaaaaaaaaaa", "module_type": "Toaster", "address": 80},
                {"uuid": "bbbbbbbbbbbbbbbb", "module_type": "Relay", "address": 72},
                {"uuid": "cccccccccccccccc", "module_type": "Led", "address": 72}
            ],
            "module_registry": {}
        })
        .to_string(),
    )
    .unwrap();

    let (manager, _feed, _handle) = boot(&config).await;
    assert_eq!(manager.load_modules().await, 1);

    let modules = manager.modules().await;
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].id.as_str(), "bbbbbbbbbbbbbbbb");
    assert_eq!(modules[0].kind, ModuleKind::Relay);
}

#[tokio::test]
async fn test_stored_relay_without_board_skipped_then_reattached() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());

    let relay = {
        let (manager, _feed, _handle) = boot(&config).await;
        manager
            .create_module(ModuleKind::Relay, addr(0x48))
            .await
            .unwrap()
    };

    let (manager, _feed, handle) = boot(&config).await;
    handle.detach(addr(0x48));
    assert_eq!(manager.load_modules().await, 0);
    assert!(manager.modules().await.is_empty());

    // The identity survives in the registry.
    handle.attach(addr(0x48), vec![]);
    let again = manager
        .create_module(ModuleKind::Relay, addr(0x48))
        .await
        .unwrap();
    assert_eq!(again.id, relay.id);
}

#[tokio::test]
async fn test_concurrent_creates_at_one_address() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());
    let (manager, _feed, _handle) = boot(&config).await;
    let manager = Arc::new(manager);

    let tasks: Vec<_> = ModuleKind::ALL
        .into_iter()
        .map(|kind| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.create_module(kind, addr(0x50)).await })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::AddressInUse(address)) => {
                assert_eq!(address, addr(0x50));
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(manager.live_addresses().await.len(), 1);
}

#[tokio::test]
async fn test_clear_registry_forgets_identities() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new(dir.path());
    let (manager, _feed, _handle) = boot(&config).await;

    let first = manager
        .create_module(ModuleKind::GasSensor, addr(0x4c))
        .await
        .unwrap();
    manager.clear_registry().await.unwrap();

    let document = manager.registry_document().await;
    assert!(document.module_registry.is_empty());
    assert_eq!(document.active_modules.len(), 1);

    manager.remove_module(&first.id).await;
    let second = manager
        .create_module(ModuleKind::GasSensor, addr(0x4c))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
}
