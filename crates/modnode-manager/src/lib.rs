//! Module lifecycle management for the modnode peripheral node.
//!
//! This crate ties the hardware, storage and network layers together:
//!
//! ```text
//! ┌──────────────┐  attach/detach   ┌──────────────────┐  publish   ┌────────────┐
//! │  BusScanner  │ ───────────────► │ LifecycleManager │ ─────────► │  Reporter  │
//! └──────┬───────┘                  └──┬─────────┬─────┘  (watch)   └─────┬──────┘
//!        │ scan                        │         │                        │ POST
//!        ▼                    identity │         │ drivers                ▼
//!   ┌─────────┐              ┌─────────▼──┐  ┌───▼───────────┐     ┌─────────────┐
//!   │   Bus   │◄─────────────┤  Registry  │  │ ModuleFactory │     │ Coordinator │
//!   └─────────┘              └────────────┘  └───────────────┘     └─────────────┘
//! ```
//!
//! - [`LifecycleManager`] owns the live module table, resolves identities
//!   through the registry, enforces one module per address and persists the
//!   active modules after every change.
//! - [`BusScanner`] diffs successive bus scans and creates or removes modules
//!   accordingly.
//! - [`Reporter`] sends the module list to the coordinator with bounded retry
//!   and wipes credentials plus resets the node when the coordinator stays
//!   unreachable.
//! - [`AddressMapping`] tells the manager which kind lives at which address.
//!
//! The manager also implements [`modnode_network::ModuleApi`], so it can be
//! handed to the HTTP server directly.

pub mod manager;
pub mod mapping;
pub mod reporter;
pub mod scanner;

pub use manager::{LifecycleManager, ReportFeed};
pub use mapping::{AddressMapping, DEFAULT_MAPPINGS};
pub use reporter::{NodeReset, ReportOutcome, Reporter, ReporterConfig};
pub use scanner::{BusScanner, ScanDiff, ScanReport, ScannerConfig, ScannerState, diff};
