//! Enum wrapper for module dispatch.
//!
//! Drivers expose native `async fn` methods, which rules out
//! `Box<dyn Module>`. [`AnyModule`] gives the lifecycle manager one concrete
//! type to store while keeping static dispatch to each driver. The role split
//! lives here: sensors refuse `set_state` with `NotControllable` and have
//! nothing to deactivate.
//!
//! # Examples
//!
//! ```
//! use modnode_hardware::{bus, AnyModule, BatteryMonitor, DriverContext, ModuleFactory};
//! use modnode_hardware::mock::MockBus;
//! use modnode_core::{BusAddress, ModuleKind, Role};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> modnode_core::Result<()> {
//!     let (mock, handle) = MockBus::new();
//!     let address = BusAddress::new(0x49)?;
//!     handle.attach(address, vec![]);
//!
//!     let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
//!     let mut led: AnyModule<MockBus> = ModuleFactory::create(ModuleKind::Led, ctx, address).await?;
//!     assert_eq!(led.role(), Role::Control);
//!
//!     let state = led.set_state(&json!(40)).await?;
//!     assert_eq!(state["brightness"], json!(40.0));
//!     Ok(())
//! }
//! ```

use crate::bus::Bus;
use crate::drivers::{GasSensor, Led, Relay, TemperatureSensor};
use modnode_core::{BusAddress, Error, ModuleKind, Role};
use serde_json::Value;

/// A live module of any supported kind.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyModule<B> {
    Led(Led<B>),
    Relay(Relay<B>),
    GasSensor(GasSensor<B>),
    TemperatureSensor(TemperatureSensor<B>),
}

impl<B: Bus> AnyModule<B> {
    /// Driver kind.
    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Led(_) => ModuleKind::Led,
            Self::Relay(_) => ModuleKind::Relay,
            Self::GasSensor(_) => ModuleKind::GasSensor,
            Self::TemperatureSensor(_) => ModuleKind::TemperatureSensor,
        }
    }

    /// Capability class.
    pub fn role(&self) -> Role {
        self.kind().role()
    }

    /// Bus address the module is bound to.
    pub fn address(&self) -> BusAddress {
        match self {
            Self::Led(device) => device.address(),
            Self::Relay(device) => device.address(),
            Self::GasSensor(device) => device.address(),
            Self::TemperatureSensor(device) => device.address(),
        }
    }

    /// Bring the device into its initial state.
    ///
    /// # Errors
    /// `DeviceUnavailable` if a relay does not take its off write.
    pub async fn initialize(&mut self) -> modnode_core::Result<()> {
        match self {
            Self::Relay(device) => device.initialize().await,
            Self::Led(_) | Self::GasSensor(_) | Self::TemperatureSensor(_) => Ok(()),
        }
    }

    /// Current state as a JSON object. Never fails; bus errors are reported
    /// in an `"error"` field.
    pub async fn get_state(&self) -> Value {
        match self {
            Self::Led(device) => device.read_state(),
            Self::Relay(device) => device.read_state(),
            Self::GasSensor(device) => device.read_state().await,
            Self::TemperatureSensor(device) => device.read_state().await,
        }
    }

    /// Apply a new state and return the resulting state.
    ///
    /// # Errors
    /// `NotControllable` for sensors, `InvalidValue` for a malformed value,
    /// `DeviceUnavailable` when the bus write fails.
    pub async fn set_state(&mut self, value: &Value) -> modnode_core::Result<Value> {
        match self {
            Self::Led(device) => device.apply_state(value).await,
            Self::Relay(device) => device.apply_state(value).await,
            Self::GasSensor(_) | Self::TemperatureSensor(_) => {
                Err(Error::NotControllable(self.kind().to_string()))
            }
        }
    }

    /// Drive a control module to its safe state. No-op for sensors.
    pub async fn deactivate(&mut self) -> modnode_core::Result<()> {
        match self {
            Self::Led(device) => device.deactivate().await,
            Self::Relay(device) => device.deactivate().await,
            Self::GasSensor(_) | Self::TemperatureSensor(_) => Ok(()),
        }
    }
}
