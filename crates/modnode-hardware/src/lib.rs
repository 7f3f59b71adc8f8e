//! Hardware layer of the modnode peripheral node.
//!
//! This crate owns everything that touches the shared bus: the [`Bus`]
//! abstraction and its implementations, the module drivers, the battery gauge,
//! the [`ModuleFactory`] that turns a kind tag into a live driver, and passive
//! identification of unknown devices.
//!
//! # Buses
//!
//! - [`HalBus`] wraps any blocking `embedded-hal` 1.0 I²C peripheral.
//! - [`mock::MockBus`] simulates attached devices for development and tests.
//!
//! Both are shared through a [`SharedBus`] handle so that scanner enumeration
//! and driver transfers never interleave.
//!
//! # Drivers
//!
//! | Kind | Role | Bus protocol |
//! |------|------|--------------|
//! | `Led` | Control | `[0x01, pwm]` |
//! | `Relay` | Control | `[0x50, 0xFF/0x00]` |
//! | `GasSensor` | Sensor | PCF8591 channel 0 |
//! | `TemperatureSensor` | Sensor | LM75B temperature register |
//!
//! # Example
//!
//! ```
//! use modnode_hardware::{bus, BatteryMonitor, DriverContext, ModuleFactory};
//! use modnode_hardware::mock::MockBus;
//! use modnode_core::{BusAddress, ModuleKind};
//!
//! #[tokio::main]
//! async fn main() -> modnode_core::Result<()> {
//!     let (mock, handle) = MockBus::new();
//!     let address = BusAddress::new(0x4f)?;
//!     handle.attach(address, vec![0x19, 0x00]);
//!
//!     let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
//!     let sensor = ModuleFactory::create(ModuleKind::TemperatureSensor, ctx, address).await?;
//!
//!     let state = sensor.get_state().await;
//!     assert_eq!(state["temperatureC"], 25.0);
//!     Ok(())
//! }
//! ```

pub mod battery;
pub mod bus;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod hal;
pub mod identify;
pub mod mock;

// Re-export commonly used types for convenience
pub use battery::{AdcChannel, BatteryMonitor};
pub use bus::{Bus, SharedBus};
pub use devices::AnyModule;
pub use drivers::DriverContext;
pub use error::{HardwareError, Result};
pub use factory::ModuleFactory;
pub use hal::HalBus;
pub use identify::{DeviceHint, Identification, identify};
