//! Bus scanner.
//!
//! Polls the shared bus on a fixed interval and turns attach/detach into
//! lifecycle manager calls:
//!
//! ```text
//!              ┌──────── interval ────────┐
//!              ▼                          │
//!   Idle ──► Scanning ──► diff(known, current)
//!                           │            │
//!                     new addresses   gone addresses
//!                           │            │
//!               mapped ─────┤            └──► remove_module_by_address
//!                 │      unmapped
//!                 ▼         ▼
//!        create_module_at  identify (log only)
//! ```
//!
//! The known set only grows by addresses whose module exists after the cycle
//! (or that are unmapped and were identified once), so a failed creation is
//! retried on the next cycle. It is seeded from the manager's live modules,
//! which makes restored modules without hardware disappear on the first cycle.
//!
//! The scanner never holds the bus lock while calling into the manager.

use crate::manager::LifecycleManager;
use modnode_core::constants::{DEFAULT_SCAN_INTERVAL_MS, MIN_SCAN_INTERVAL_MS};
use modnode_core::{BusAddress, Error, ModuleInfo};
use modnode_hardware::{Bus, Identification, SharedBus, identify};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for [`BusScanner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Time between two scans, never below 100 ms
    pub interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
        }
    }
}

impl ScannerConfig {
    /// Set the scan interval, clamped to the 100 ms minimum.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(MIN_SCAN_INTERVAL_MS));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Scanning,
}

/// Addresses that appeared and disappeared between two scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanDiff {
    /// In `current` but not in `known`, ascending
    pub added: Vec<BusAddress>,
    /// In `known` but not in `current`, ascending
    pub removed: Vec<BusAddress>,
}

impl ScanDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare the last known address set with the current one.
pub fn diff(known: &BTreeSet<BusAddress>, current: &BTreeSet<BusAddress>) -> ScanDiff {
    ScanDiff {
        added: current.difference(known).copied().collect(),
        removed: known.difference(current).copied().collect(),
    }
}

/// What one scan cycle did.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Addresses answering this cycle
    pub present: Vec<BusAddress>,
    pub created: Vec<ModuleInfo>,
    pub removed: Vec<BusAddress>,
    /// Unmapped devices that answered identification
    pub identified: Vec<Identification>,
    /// Mapped addresses whose module could not be created; retried next cycle
    pub pending: Vec<BusAddress>,
}

/// Periodic bus scanner driving a [`LifecycleManager`].
#[derive(Debug)]
pub struct BusScanner<B: Bus> {
    manager: Arc<LifecycleManager<B>>,
    bus: SharedBus<B>,
    config: ScannerConfig,
    known: Option<BTreeSet<BusAddress>>,
    state: ScannerState,
}

impl<B: Bus> BusScanner<B> {
    pub fn new(manager: Arc<LifecycleManager<B>>, bus: SharedBus<B>, config: ScannerConfig) -> Self {
        let config = ScannerConfig::default().interval(config.interval);
        Self {
            manager,
            bus,
            config,
            known: None,
            state: ScannerState::Idle,
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Addresses seen at the end of the last cycle.
    pub fn known_addresses(&self) -> BTreeSet<BusAddress> {
        self.known.clone().unwrap_or_default()
    }

    /// Enumerate the bus once without touching any module.
    ///
    /// # Errors
    /// Returns the bus error if enumeration fails.
    pub async fn enumerate_bus(&self) -> modnode_hardware::Result<Vec<BusAddress>> {
        let found = self.bus.lock().await.scan().await?;
        info!(count = found.len(), addresses = ?found, "Manual bus scan");
        Ok(found)
    }

    /// Run one scan cycle.
    ///
    /// # Errors
    /// Returns the bus error if enumeration fails; the known set is left
    /// untouched.
    pub async fn scan_once(&mut self) -> modnode_hardware::Result<ScanReport> {
        let mut known = match self.known.take() {
            Some(known) => known,
            None => self.manager.live_addresses().await,
        };

        self.state = ScannerState::Scanning;
        let scanned = self.bus.lock().await.scan().await;
        let current: BTreeSet<BusAddress> = match scanned {
            Ok(found) => found.into_iter().collect(),
            Err(e) => {
                self.known = Some(known);
                self.state = ScannerState::Idle;
                return Err(e);
            }
        };

        let changes = diff(&known, &current);
        let mut report = ScanReport {
            present: current.iter().copied().collect(),
            ..Default::default()
        };

        for address in changes.removed {
            info!(%address, "Device detached");
            self.manager.remove_module_by_address(address).await;
            known.remove(&address);
            report.removed.push(address);
        }

        for address in changes.added {
            info!(%address, "Device attached");

            if self.manager.mapped_kind(address).is_none() {
                match identify(&self.bus, address).await {
                    Ok(found) => report.identified.push(found),
                    Err(e) => debug!(%address, error = %e, "Identification failed"),
                }
                warn!(%address, "No module mapping for device");
                known.insert(address);
                continue;
            }

            match self.manager.create_module_at(address).await {
                Ok(info) => {
                    known.insert(address);
                    report.created.push(info);
                }
                Err(Error::AddressInUse(_)) => {
                    debug!(%address, "Module already present");
                    known.insert(address);
                }
                Err(e) => {
                    warn!(%address, error = %e, "Module creation failed, retrying next scan");
                    report.pending.push(address);
                }
            }
        }

        if !report.created.is_empty() || !report.removed.is_empty() {
            info!(present = ?report.present, "Bus changed");
        }

        self.known = Some(known);
        self.state = ScannerState::Idle;
        Ok(report)
    }

    /// Scan every interval until `shutdown` fires.
    ///
    /// A failed enumeration is logged and the cycle skipped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(interval_ms = self.config.interval.as_millis() as u64, "Bus scanner started");

        loop {
            if let Err(e) = self.scan_once().await {
                warn!(error = %e, "Bus scan failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Bus scanner shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn addrs(raw: &[u8]) -> BTreeSet<BusAddress> {
        raw.iter().map(|r| BusAddress::new(*r).unwrap()).collect()
    }

    #[test]
    fn test_diff_add_and_remove() {
        let changes = diff(&addrs(&[0x48, 0x49]), &addrs(&[0x49, 0x4c]));
        assert_eq!(changes.added, vec![BusAddress::new(0x4c).unwrap()]);
        assert_eq!(changes.removed, vec![BusAddress::new(0x48).unwrap()]);
    }

    #[test]
    fn test_diff_unchanged() {
        assert!(diff(&addrs(&[0x48]), &addrs(&[0x48])).is_empty());
    }

    #[rstest]
    #[case(Duration::from_millis(10), Duration::from_millis(100))]
    #[case(Duration::from_millis(100), Duration::from_millis(100))]
    #[case(Duration::from_secs(5), Duration::from_secs(5))]
    fn test_interval_clamped(#[case] requested: Duration, #[case] expected: Duration) {
        assert_eq!(ScannerConfig::default().interval(requested).interval, expected);
    }

    #[test]
    fn test_config_default() {
        assert_eq!(ScannerConfig::default().interval, Duration::from_secs(1));
    }

    fn address_set() -> impl Strategy<Value = BTreeSet<BusAddress>> {
        proptest::collection::btree_set(0x08u8..=0x77, 0..24).prop_map(|raw| {
            raw.into_iter()
                .filter_map(|r| BusAddress::new(r).ok())
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_diff_reconstructs_current(known in address_set(), current in address_set()) {
            let changes = diff(&known, &current);

            let mut rebuilt = known.clone();
            for address in &changes.removed {
                prop_assert!(rebuilt.remove(address));
            }
            for address in &changes.added {
                prop_assert!(rebuilt.insert(*address));
            }
            prop_assert_eq!(&rebuilt, &current);
        }

        #[test]
        fn prop_diff_sides_are_disjoint_and_sorted(known in address_set(), current in address_set()) {
            let changes = diff(&known, &current);

            prop_assert!(changes.added.iter().all(|a| current.contains(a) && !known.contains(a)));
            prop_assert!(changes.removed.iter().all(|a| known.contains(a) && !current.contains(a)));
            prop_assert!(changes.added.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(changes.removed.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
