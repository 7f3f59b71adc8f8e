//! Lifecycle manager.
//!
//! The [`LifecycleManager`] is the single owner of the live module table. Every
//! mutation (scanner attach and detach, HTTP create and remove, boot restore)
//! goes through it, so identity resolution, address exclusivity, persistence
//! and reporting happen in exactly one place.
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` guards the live table together with the identity
//! registry. It is held for the whole read-modify-write of an operation,
//! including driver construction and the snapshot write, and released before
//! the snapshot is published. Drivers take the bus lock while the table lock is
//! held, never the other way around.
//!
//! The address mapping sits behind its own `RwLock`; it is only copied out,
//! never held across an await.
//!
//! # Reporting
//!
//! Each successful create or remove publishes the full module list on a
//! `watch` channel ([`ReportFeed`]). The channel keeps only the latest value,
//! so a slow coordinator sees bursts of changes coalesced into one report.
//!
//! # Examples
//!
//! ```
//! use modnode_core::{BusAddress, ModuleKind};
//! use modnode_hardware::{bus, mock::MockBus, BatteryMonitor, DriverContext};
//! use modnode_manager::{AddressMapping, LifecycleManager};
//! use modnode_storage::ModuleRegistry;
//!
//! #[tokio::main]
//! async fn main() -> modnode_core::Result<()> {
//!     let (mock, _handle) = MockBus::new();
//!     let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
//!     let registry = ModuleRegistry::in_memory().await;
//!
//!     let (manager, mut feed) = LifecycleManager::new(ctx, registry, AddressMapping::default());
//!
//!     let relay = manager.create_module(ModuleKind::Relay, BusAddress::new(0x48)?).await?;
//!     assert_eq!(manager.get_state(&relay.id).await?["isOn"], false);
//!
//!     feed.changed().await.unwrap();
//!     assert_eq!(feed.borrow().len(), 1);
//!     Ok(())
//! }
//! ```

use crate::mapping::AddressMapping;
use futures::future::BoxFuture;
use modnode_core::{BusAddress, Error, ModuleId, ModuleInfo, ModuleKind, Result, Role};
use modnode_hardware::{AnyModule, Bus, DriverContext, ModuleFactory};
use modnode_network::ModuleApi;
use modnode_storage::{ModuleRecord, ModuleRegistry, RegistryDocument};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Receiving end of the module list published after every change.
pub type ReportFeed = watch::Receiver<Vec<ModuleInfo>>;

/// State guarded by the table lock.
struct Inner<B: Bus> {
    modules: BTreeMap<ModuleId, AnyModule<B>>,
    registry: ModuleRegistry,
}

impl<B: Bus> Inner<B> {
    fn id_at(&self, address: BusAddress) -> Option<&ModuleId> {
        self.modules
            .iter()
            .find(|(_, module)| module.address() == address)
            .map(|(id, _)| id)
    }

    fn infos(&self) -> Vec<ModuleInfo> {
        self.modules
            .iter()
            .map(|(id, module)| describe(id, module))
            .collect()
    }

    /// Write the live table as the active-module snapshot.
    ///
    /// Must be called with the table lock held. Failures are logged, the live
    /// table stays authoritative.
    async fn save(&mut self) {
        let records = self
            .modules
            .iter()
            .map(|(id, module)| ModuleRecord::new(id.clone(), module.kind(), module.address()))
            .collect();

        if let Err(e) = self.registry.save_active_modules(records).await {
            let error = Error::from(e);
            warn!(error = %error, "Active modules not persisted");
        }
    }
}

fn describe<B: Bus>(id: &ModuleId, module: &AnyModule<B>) -> ModuleInfo {
    ModuleInfo {
        id: id.clone(),
        kind: module.kind(),
        address: module.address(),
        role: module.role(),
    }
}

/// Owner of the live module table.
pub struct LifecycleManager<B: Bus> {
    inner: Mutex<Inner<B>>,
    mapping: RwLock<AddressMapping>,
    ctx: DriverContext<B>,
    feed: watch::Sender<Vec<ModuleInfo>>,
}

impl<B: Bus> std::fmt::Debug for LifecycleManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("mapping", &self.mappings())
            .finish_non_exhaustive()
    }
}

impl<B: Bus> LifecycleManager<B> {
    /// Create a manager with an empty live table.
    ///
    /// Call [`load_modules`](Self::load_modules) to restore the modules that
    /// were active before the last shutdown.
    pub fn new(
        ctx: DriverContext<B>,
        registry: ModuleRegistry,
        mapping: AddressMapping,
    ) -> (Self, ReportFeed) {
        let (feed, receiver) = watch::channel(Vec::new());
        let manager = Self {
            inner: Mutex::new(Inner {
                modules: BTreeMap::new(),
                registry,
            }),
            mapping: RwLock::new(mapping),
            ctx,
            feed,
        };
        (manager, receiver)
    }

    /// Another receiver of the module list feed.
    pub fn subscribe(&self) -> ReportFeed {
        self.feed.subscribe()
    }

    fn publish(&self, modules: Vec<ModuleInfo>) {
        debug!(count = modules.len(), "Publishing module list");
        self.feed.send_replace(modules);
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a module of `kind` at `address`.
    ///
    /// The identity comes from the registry, so re-creating the same
    /// `(kind, address)` pair yields the same identity.
    ///
    /// # Errors
    /// `AddressInUse` if a live module already occupies `address`,
    /// `DeviceUnavailable` if the driver cannot initialize the device.
    pub async fn create_module(&self, kind: ModuleKind, address: BusAddress) -> Result<ModuleInfo> {
        let (info, snapshot) = {
            let mut inner = self.inner.lock().await;

            if let Some(existing) = inner.id_at(address) {
                debug!(%kind, %address, existing = %existing, "Address already in use");
                return Err(Error::AddressInUse(address));
            }

            let module = ModuleFactory::create(kind, self.ctx.clone(), address).await?;
            let id = inner.registry.get_or_create(kind, address).await;
            let info = describe(&id, &module);
            inner.modules.insert(id, module);
            inner.save().await;

            (info, inner.infos())
        };

        info!(id = %info.id, kind = %info.kind, address = %info.address, role = %info.role, "Module created");
        self.publish(snapshot);
        Ok(info)
    }

    /// Create a module from a kind tag (case-insensitive).
    ///
    /// # Errors
    /// `UnknownKind` for an unsupported tag, otherwise as
    /// [`create_module`](Self::create_module).
    pub async fn create_module_by_name(&self, kind: &str, address: BusAddress) -> Result<ModuleInfo> {
        let kind: ModuleKind = kind.parse()?;
        self.create_module(kind, address).await
    }

    /// Create the module the mapping assigns to `address`.
    ///
    /// # Errors
    /// `UnknownKind` if `address` is unmapped, otherwise as
    /// [`create_module`](Self::create_module).
    pub async fn create_module_at(&self, address: BusAddress) -> Result<ModuleInfo> {
        let kind = self
            .mapped_kind(address)
            .ok_or_else(|| Error::UnknownKind(format!("no mapping for {address}")))?;
        self.create_module(kind, address).await
    }

    /// Create a module of `kind` at the first free address mapped to it.
    ///
    /// # Errors
    /// `NoFreeAddress` when every mapped address for `kind` is occupied.
    pub async fn create_module_auto(&self, kind: ModuleKind) -> Result<ModuleInfo> {
        let candidates: Vec<BusAddress> = self.mappings().addresses_for(kind).collect();

        let (info, snapshot) = {
            let mut inner = self.inner.lock().await;

            let Some(address) = candidates
                .into_iter()
                .find(|address| inner.id_at(*address).is_none())
            else {
                return Err(Error::NoFreeAddress(kind));
            };

            let module = ModuleFactory::create(kind, self.ctx.clone(), address).await?;
            let id = inner.registry.get_or_create(kind, address).await;
            let info = describe(&id, &module);
            inner.modules.insert(id, module);
            inner.save().await;

            (info, inner.infos())
        };

        info!(id = %info.id, kind = %info.kind, address = %info.address, "Module created at free address");
        self.publish(snapshot);
        Ok(info)
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove a module. Removing an unknown identity is a no-op.
    ///
    /// Control modules are driven to their safe state first. Returns whether
    /// a module was removed.
    pub async fn remove_module(&self, id: &ModuleId) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            let Some(module) = inner.modules.remove(id) else {
                debug!(id = %id, "Remove of unknown module ignored");
                return false;
            };
            retire(id, module).await;
            inner.save().await;
            inner.infos()
        };

        self.publish(snapshot);
        true
    }

    /// Remove whichever module occupies `address`. No-op if none does.
    pub async fn remove_module_by_address(&self, address: BusAddress) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            let Some(id) = inner.id_at(address).cloned() else {
                debug!(%address, "No module at address");
                return false;
            };
            if let Some(module) = inner.modules.remove(&id) {
                retire(&id, module).await;
            }
            inner.save().await;
            inner.infos()
        };

        self.publish(snapshot);
        true
    }

    // ------------------------------------------------------------------
    // Queries and commands
    // ------------------------------------------------------------------

    pub async fn get_module(&self, id: &ModuleId) -> Option<ModuleInfo> {
        let inner = self.inner.lock().await;
        inner.modules.get(id).map(|module| describe(id, module))
    }

    /// Current state of a module.
    ///
    /// # Errors
    /// `NotFound` for an unknown identity.
    pub async fn get_state(&self, id: &ModuleId) -> Result<Value> {
        let inner = self.inner.lock().await;
        let module = inner
            .modules
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(module.get_state().await)
    }

    /// Apply `value` to a control module and return its new state.
    ///
    /// # Errors
    /// `NotFound`, `NotControllable` for sensors, `InvalidValue` or
    /// `DeviceUnavailable` from the driver.
    pub async fn set_state(&self, id: &ModuleId, value: &Value) -> Result<Value> {
        let mut inner = self.inner.lock().await;
        let module = inner
            .modules
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if module.role() != Role::Control {
            return Err(Error::NotControllable(module.kind().to_string()));
        }

        let state = module.set_state(value).await?;
        debug!(id = %id, %state, "Module state applied");
        Ok(state)
    }

    /// Identity to kind for every live module.
    pub async fn list_modules(&self) -> BTreeMap<ModuleId, ModuleKind> {
        let inner = self.inner.lock().await;
        inner
            .modules
            .iter()
            .map(|(id, module)| (id.clone(), module.kind()))
            .collect()
    }

    /// Full description of every live module.
    pub async fn modules(&self) -> Vec<ModuleInfo> {
        self.inner.lock().await.infos()
    }

    /// Addresses occupied by live modules.
    pub async fn live_addresses(&self) -> BTreeSet<BusAddress> {
        let inner = self.inner.lock().await;
        inner.modules.values().map(|module| module.address()).collect()
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Map `address` to `kind` for future creations.
    pub fn add_mapping(&self, address: BusAddress, kind: ModuleKind) {
        let previous = self
            .mapping
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, kind);
        info!(%address, %kind, ?previous, "Address mapping added");
    }

    pub fn mapped_kind(&self, address: BusAddress) -> Option<ModuleKind> {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .kind_for(address)
    }

    /// Copy of the current mapping.
    pub fn mappings(&self) -> AddressMapping {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Restore the modules that were active at the last snapshot.
    ///
    /// Records with an unknown kind, an invalid address, an address already
    /// taken or a device that fails initialization are skipped. The resulting list is persisted and published.
    /// Returns the number of modules restored.
    pub async fn load_modules(&self) -> usize {
        let (restored, snapshot) = {
            let mut inner = self.inner.lock().await;
            let records = inner.registry.active_modules().to_vec();
            let mut restored = 0;

            for record in records {
                let (kind, address) = match (record.kind(), record.bus_address()) {
                    (Ok(kind), Ok(address)) => (kind, address),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(uuid = %record.uuid, module_type = %record.module_type, error = %e, "Skipping stored module");
                        continue;
                    }
                };

                if inner.modules.contains_key(&record.uuid) || inner.id_at(address).is_some() {
                    warn!(uuid = %record.uuid, %address, "Skipping stored module, slot taken");
                    continue;
                }

                let module = match ModuleFactory::create(kind, self.ctx.clone(), address).await {
                    Ok(module) => module,
                    Err(e) => {
                        warn!(
                            uuid = %record.uuid,
                            %kind,
                            %address,
                            error = %e,
                            "Skipping stored module, device not ready"
                        );
                        continue;
                    }
                };
                info!(uuid = %record.uuid, %kind, %address, "Module restored");
                inner.modules.insert(record.uuid, module);
                restored += 1;
            }

            inner.save().await;
            (restored, inner.infos())
        };

        info!(restored, "Stored modules loaded");
        self.publish(snapshot);
        restored
    }

    /// Forget every stored identity.
    ///
    /// Live modules keep their identity for the rest of the process and the
    /// active-module snapshot is rewritten from the live table.
    ///
    /// # Errors
    /// `PersistenceFailure` if the cleared document cannot be written.
    pub async fn clear_registry(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.registry.clear().await?;
        inner.save().await;
        Ok(())
    }

    /// Copy of the registry document, for diagnostics.
    pub async fn registry_document(&self) -> RegistryDocument {
        self.inner.lock().await.registry.document().clone()
    }
}

/// Drive a removed module to its safe state before dropping it.
async fn retire<B: Bus>(id: &ModuleId, mut module: AnyModule<B>) {
    if module.role() == Role::Control
        && let Err(e) = module.deactivate().await
    {
        warn!(id = %id, kind = %module.kind(), error = %e, "Deactivation failed");
    }
    info!(id = %id, kind = %module.kind(), address = %module.address(), "Module removed");
}

impl<B: Bus> ModuleApi for LifecycleManager<B> {
    fn list_modules(&self) -> BoxFuture<'_, BTreeMap<ModuleId, ModuleKind>> {
        Box::pin(LifecycleManager::list_modules(self))
    }

    fn module_state(&self, id: ModuleId) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { self.get_state(&id).await })
    }

    fn set_module_state(&self, id: ModuleId, state: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { self.set_state(&id, &state).await })
    }

    fn create_module(
        &self,
        kind: String,
        address: Option<BusAddress>,
    ) -> BoxFuture<'_, Result<ModuleInfo>> {
        Box::pin(async move {
            let kind: ModuleKind = kind.parse()?;
            match address {
                Some(address) => LifecycleManager::create_module(self, kind, address).await,
                None => self.create_module_auto(kind).await,
            }
        })
    }

    fn remove_module(&self, id: ModuleId) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            LifecycleManager::remove_module(self, &id).await;
        })
    }
}
