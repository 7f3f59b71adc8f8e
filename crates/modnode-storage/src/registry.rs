//! Identity registry and active-module snapshot.
//!
//! Bus addresses are few and get reused, yet the coordinator tracks modules by
//! identity. The registry maps each `(kind, address)` pair to an identity that
//! survives restarts, and stores the last snapshot of live modules so they can
//! be restored at boot. Both live in one JSON document:
//!
//! ```json
//! {
//!   "active_modules": [{"uuid": "8c1f02a4d9e37b60", "module_type": "Relay", "address": 72}],
//!   "module_registry": {"Relay_72": "8c1f02a4d9e37b60"}
//! }
//! ```
//!
//! Older firmware wrote a bare array of active modules and named the address
//! field `i2c_address`; both forms are accepted on load.
//!
//! The registry is not internally synchronized. Its owner (the lifecycle
//! manager) keeps it behind the same lock as the live module table.

use crate::document::DocumentStore;
use crate::error::{StorageError, StorageResult};
use modnode_core::{BusAddress, Error, ModuleId, ModuleKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Registry key of a `(kind, address)` pair, address in decimal.
pub fn registry_key(kind: ModuleKind, address: BusAddress) -> String {
    format!("{}_{}", kind.as_str(), address.as_u8())
}

/// One live module as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub uuid: ModuleId,
    pub module_type: String,
    #[serde(alias = "i2c_address")]
    pub address: u8,
}

impl ModuleRecord {
    pub fn new(uuid: ModuleId, kind: ModuleKind, address: BusAddress) -> Self {
        Self {
            uuid,
            module_type: kind.as_str().to_string(),
            address: address.as_u8(),
        }
    }

    /// Parsed kind tag.
    pub fn kind(&self) -> modnode_core::Result<ModuleKind> {
        self.module_type.parse()
    }

    /// Validated bus address.
    pub fn bus_address(&self) -> modnode_core::Result<BusAddress> {
        BusAddress::new(self.address)
    }
}

/// The persisted registry document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub active_modules: Vec<ModuleRecord>,
    #[serde(default)]
    pub module_registry: BTreeMap<String, ModuleId>,
}

impl RegistryDocument {
    /// Upgrade a legacy bare array of active modules.
    fn from_legacy(active_modules: Vec<ModuleRecord>) -> Self {
        let module_registry = active_modules
            .iter()
            .map(|record| {
                (
                    format!("{}_{}", record.module_type, record.address),
                    record.uuid.clone(),
                )
            })
            .collect();

        Self {
            active_modules,
            module_registry,
        }
    }

    /// Decode either document layout.
    pub fn parse(bytes: &[u8]) -> StorageResult<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Legacy(Vec<ModuleRecord>),
            Current(RegistryDocument),
        }

        Ok(match serde_json::from_slice(bytes)? {
            Stored::Legacy(records) => Self::from_legacy(records),
            Stored::Current(document) => document,
        })
    }
}

/// Identity registry backed by a [`DocumentStore`].
#[derive(Debug)]
pub struct ModuleRegistry {
    store: DocumentStore,
    document: RegistryDocument,
    /// False when the stored document exists but could not be read. Writes
    /// are refused until [`clear`](Self::clear) so it is not overwritten.
    writable: bool,
}

impl ModuleRegistry {
    /// Load the registry from `store`.
    ///
    /// A missing document yields an empty registry. A corrupt document is
    /// logged and treated as empty; it is overwritten on the next successful
    /// save.
    ///
    /// A document that cannot be read at all (permissions, I/O fault) also
    /// opens empty, but the registry then runs from memory only: saves fail
    /// and the stored identities are left in place for the next boot.
    pub async fn open(store: DocumentStore) -> Self {
        let mut writable = true;
        let document = match store.read().await {
            Ok(Some(bytes)) => match RegistryDocument::parse(&bytes) {
                Ok(document) => document,
                Err(e) => {
                    warn!(location = %store.location(), error = %e, "Corrupt module registry, starting empty");
                    RegistryDocument::default()
                }
            },
            Ok(None) => {
                debug!(location = %store.location(), "No module registry yet");
                RegistryDocument::default()
            }
            Err(e) => {
                warn!(
                    location = %store.location(),
                    error = %e,
                    "Module registry unreadable, running without persistence"
                );
                writable = false;
                RegistryDocument::default()
            }
        };

        info!(
            identities = document.module_registry.len(),
            active = document.active_modules.len(),
            "Module registry loaded"
        );

        Self {
            store,
            document,
            writable,
        }
    }

    /// In-memory registry, for tests and diskless simulation.
    pub async fn in_memory() -> Self {
        Self::open(DocumentStore::memory()).await
    }

    /// Identity of `(kind, address)`, minting and persisting a new one on
    /// first sight.
    ///
    /// Never fails: if the document cannot be written the new identity is
    /// still returned and kept in memory.
    pub async fn get_or_create(&mut self, kind: ModuleKind, address: BusAddress) -> ModuleId {
        let key = registry_key(kind, address);

        if let Some(id) = self.document.module_registry.get(&key) {
            debug!(%kind, %address, id = %id, "Reusing identity");
            return id.clone();
        }

        let id = ModuleId::generate();
        self.document.module_registry.insert(key, id.clone());

        match self.flush().await {
            Ok(()) => info!(%kind, %address, id = %id, "Created identity"),
            Err(e) => {
                let error = Error::from(e);
                warn!(%kind, %address, id = %id, error = %error, "Identity not persisted");
            }
        }

        id
    }

    /// Identity of `(kind, address)` if one was ever minted.
    pub fn lookup(&self, kind: ModuleKind, address: BusAddress) -> Option<&ModuleId> {
        self.document.module_registry.get(&registry_key(kind, address))
    }

    /// Replace the active-module snapshot and persist the document.
    pub async fn save_active_modules(&mut self, records: Vec<ModuleRecord>) -> StorageResult<()> {
        self.document.active_modules = records;
        self.flush().await
    }

    /// Last persisted active-module snapshot.
    pub fn active_modules(&self) -> &[ModuleRecord] {
        &self.document.active_modules
    }

    /// Whether saves reach the backing store.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Forget every identity and the active-module snapshot.
    ///
    /// Also overwrites a document that could not be read at open.
    pub async fn clear(&mut self) -> StorageResult<()> {
        self.document = RegistryDocument::default();
        self.writable = true;
        self.flush().await?;
        info!("Module registry cleared");
        Ok(())
    }

    /// The whole document, for diagnostics.
    pub fn document(&self) -> &RegistryDocument {
        &self.document
    }

    async fn flush(&self) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::Unavailable(format!(
                "{} was not loaded, refusing to overwrite it",
                self.store.location()
            )));
        }
        let bytes = serde_json::to_vec(&self.document)?;
        self.store.write(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use serde_json::json;

    fn addr(raw: u8) -> BusAddress {
        BusAddress::new(raw).unwrap()
    }

    #[test]
    fn test_registry_key_uses_decimal_address() {
        assert_eq!(registry_key(ModuleKind::Relay, addr(0x48)), "Relay_72");
        assert_eq!(
            registry_key(ModuleKind::TemperatureSensor, addr(0x4f)),
            "TemperatureSensor_79"
        );
    }

    #[test]
    fn test_parse_current_layout() {
        let bytes = json!({
            "active_modules": [{"uuid": "aa00000000000001", "module_type": "Led", "address": 73}],
            "module_registry": {"Led_73": "aa00000000000001"}
        })
        .to_string();

        let document = RegistryDocument::parse(bytes.as_bytes()).unwrap();
        assert_eq!(document.active_modules.len(), 1);
        assert_eq!(document.active_modules[0].kind().unwrap(), ModuleKind::Led);
        assert_eq!(document.module_registry["Led_73"].as_str(), "aa00000000000001");
    }

    #[test]
    fn test_parse_legacy_array() {
        let bytes = json!([
            {"uuid": "bb00000000000002", "module_type": "Relay", "i2c_address": 72},
            {"uuid": "bb00000000000003", "module_type": "GasSensor", "i2c_address": 76}
        ])
        .to_string();

        let document = RegistryDocument::parse(bytes.as_bytes()).unwrap();
        assert_eq!(document.active_modules.len(), 2);
        assert_eq!(document.active_modules[1].address, 76);
        assert_eq!(document.module_registry["Relay_72"].as_str(), "bb00000000000002");
        assert_eq!(
            document.module_registry["GasSensor_76"].as_str(),
            "bb00000000000003"
        );
    }

    #[test]
    fn test_parse_missing_sections() {
        let document = RegistryDocument::parse(b"{}").unwrap();
        assert_eq!(document, RegistryDocument::default());
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let mut registry = ModuleRegistry::in_memory().await;

        let first = registry.get_or_create(ModuleKind::Relay, addr(0x48)).await;
        let again = registry.get_or_create(ModuleKind::Relay, addr(0x48)).await;
        let other = registry.get_or_create(ModuleKind::Led, addr(0x48)).await;

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(registry.lookup(ModuleKind::Relay, addr(0x48)), Some(&first));
    }

    #[tokio::test]
    async fn test_new_identity_is_flushed() {
        let memory = MemoryDocument::default();
        let mut registry = ModuleRegistry::open(DocumentStore::Memory(memory.clone())).await;

        let id = registry.get_or_create(ModuleKind::Led, addr(0x49)).await;

        let stored = RegistryDocument::parse(&memory.contents().unwrap()).unwrap();
        assert_eq!(stored.module_registry["Led_73"], id);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_returns_identity() {
        let memory = MemoryDocument::default();
        memory.set_fail_writes(true);
        let mut registry = ModuleRegistry::open(DocumentStore::Memory(memory.clone())).await;

        let id = registry.get_or_create(ModuleKind::GasSensor, addr(0x4c)).await;
        assert_eq!(registry.get_or_create(ModuleKind::GasSensor, addr(0x4c)).await, id);
        assert_eq!(memory.contents(), None);
    }

    #[tokio::test]
    async fn test_corrupt_document_opens_empty() {
        let memory = MemoryDocument::default();
        memory.set_contents("{not json");

        let registry = ModuleRegistry::open(DocumentStore::Memory(memory)).await;
        assert!(registry.document().module_registry.is_empty());
        assert!(registry.active_modules().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_document_is_not_overwritten() {
        let stored = json!({
            "active_modules": [],
            "module_registry": {"Relay_72": "cc00000000000001"}
        })
        .to_string();
        let memory = MemoryDocument::default();
        memory.set_contents(stored.clone());
        memory.set_fail_reads(true);

        let mut registry = ModuleRegistry::open(DocumentStore::Memory(memory.clone())).await;
        assert!(!registry.is_writable());
        assert!(registry.document().module_registry.is_empty());

        // Identities still work from memory.
        let id = registry.get_or_create(ModuleKind::Led, addr(0x49)).await;
        assert_eq!(registry.lookup(ModuleKind::Led, addr(0x49)), Some(&id));

        let saved = registry
            .save_active_modules(vec![ModuleRecord::new(id, ModuleKind::Led, addr(0x49))])
            .await;
        assert!(matches!(saved, Err(StorageError::Unavailable(_))));
        assert_eq!(memory.contents(), Some(stored.into_bytes()));

        // Once readable again, the next boot sees the original identities.
        memory.set_fail_reads(false);
        let reopened = ModuleRegistry::open(DocumentStore::Memory(memory)).await;
        assert!(reopened.is_writable());
        assert_eq!(
            reopened.document().module_registry["Relay_72"].as_str(),
            "cc00000000000001"
        );
    }

    #[tokio::test]
    async fn test_clear_overwrites_unreadable_document() {
        let memory = MemoryDocument::default();
        memory.set_contents("{}");
        memory.set_fail_reads(true);
        let mut registry = ModuleRegistry::open(DocumentStore::Memory(memory.clone())).await;

        registry.clear().await.unwrap();
        assert!(registry.is_writable());
        let stored = RegistryDocument::parse(&memory.contents().unwrap()).unwrap();
        assert_eq!(stored, RegistryDocument::default());
    }

    #[tokio::test]
    async fn test_clear() {
        let mut registry = ModuleRegistry::in_memory().await;
        let id = registry.get_or_create(ModuleKind::Relay, addr(0x48)).await;
        registry
            .save_active_modules(vec![ModuleRecord::new(id, ModuleKind::Relay, addr(0x48))])
            .await
            .unwrap();

        registry.clear().await.unwrap();
        assert_eq!(registry.document(), &RegistryDocument::default());
    }
}
