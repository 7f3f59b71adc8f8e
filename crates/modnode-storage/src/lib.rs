//! Storage layer for the modnode peripheral node.
//!
//! The node persists two small JSON documents in its state directory:
//!
//! - [`ModuleRegistry`] (`modules.json`) - stable module identities keyed by
//!   `(kind, address)` plus the last snapshot of live modules
//! - [`CredentialStore`] (`wifi_credentials.json`) - network credentials and
//!   the coordinator address written by provisioning
//!
//! Both sit on a [`DocumentStore`], which is either a file (replaced
//! atomically on every write) or an in-memory buffer for tests.
//!
//! # Examples
//!
//! ```no_run
//! use modnode_storage::{DocumentStore, ModuleRegistry, StorageConfig};
//! use modnode_core::{BusAddress, ModuleKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StorageConfig::new("/var/lib/modnode");
//! let mut registry = ModuleRegistry::open(DocumentStore::file(config.registry_path())).await;
//!
//! let id = registry.get_or_create(ModuleKind::Relay, BusAddress::new(0x48)?).await;
//! println!("relay identity: {id}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod document;
pub mod error;
pub mod registry;

pub use config::StorageConfig;
pub use credentials::{CredentialStore, NetworkCredentials};
pub use document::{DocumentStore, MemoryDocument};
pub use error::{StorageError, StorageResult};
pub use registry::{ModuleRecord, ModuleRegistry, RegistryDocument, registry_key};
