//! Driver factory.
//!
//! Builds a ready-to-use [`AnyModule`] from a kind tag and an address. Control
//! modules are initialized (driven off) before they are returned; a module
//! whose initialization fails is not returned.

use crate::bus::Bus;
use crate::devices::AnyModule;
use crate::drivers::{DriverContext, GasSensor, Led, Relay, TemperatureSensor};
use modnode_core::{BusAddress, ModuleKind};
use tracing::debug;

/// Factory for module drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleFactory;

impl ModuleFactory {
    /// Build and initialize a driver of `kind` at `address`.
    ///
    /// # Errors
    /// `DeviceUnavailable` when initialization does not reach the device.
    pub async fn create<B: Bus>(
        kind: ModuleKind,
        ctx: DriverContext<B>,
        address: BusAddress,
    ) -> modnode_core::Result<AnyModule<B>> {
        let mut module = match kind {
            ModuleKind::Led => AnyModule::Led(Led::new(ctx, address)),
            ModuleKind::Relay => AnyModule::Relay(Relay::new(ctx, address)),
            ModuleKind::GasSensor => AnyModule::GasSensor(GasSensor::new(ctx, address)),
            ModuleKind::TemperatureSensor => {
                AnyModule::TemperatureSensor(TemperatureSensor::new(ctx, address))
            }
        };

        module.initialize().await?;
        debug!(%kind, %address, "Driver created");
        Ok(module)
    }

    /// Build a driver from a kind tag (case-insensitive).
    ///
    /// # Errors
    /// Returns `Error::UnknownKind` for an unsupported tag.
    pub async fn create_named<B: Bus>(
        kind: &str,
        ctx: DriverContext<B>,
        address: BusAddress,
    ) -> modnode_core::Result<AnyModule<B>> {
        let kind: ModuleKind = kind.parse()?;
        Self::create(kind, ctx, address).await
    }
}
