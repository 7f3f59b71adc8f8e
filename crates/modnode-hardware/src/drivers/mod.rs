//! Module drivers.
//!
//! Each driver owns a [`DriverContext`] (bus handle plus battery gauge) and the
//! address of its device. Sensors expose `read_state()`, controls additionally
//! expose `apply_state()` and `deactivate()`. States are JSON objects whose
//! keys are part of the public HTTP contract.

pub mod gas;
pub mod led;
pub mod relay;
pub mod temperature;

pub use gas::GasSensor;
pub use led::Led;
pub use relay::Relay;
pub use temperature::TemperatureSensor;

use crate::battery::BatteryMonitor;
use crate::bus::SharedBus;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

/// Resources shared by every driver of a node.
pub struct DriverContext<B> {
    /// The node bus.
    pub bus: SharedBus<B>,

    /// The node battery gauge.
    pub battery: BatteryMonitor,
}

impl<B> DriverContext<B> {
    /// Bundle a bus handle and a battery gauge.
    pub fn new(bus: SharedBus<B>, battery: BatteryMonitor) -> Self {
        Self { bus, battery }
    }

    /// `batteryLevel` value: a percentage, or `null` without an ADC.
    pub fn battery_level(&self) -> Value {
        match self.battery.percentage() {
            Some(percent) => json!(percent),
            None => Value::Null,
        }
    }

    /// Build a state object from `fields` and append `batteryLevel`.
    pub(crate) fn state_with_battery(&self, fields: Map<String, Value>) -> Value {
        let mut state = fields;
        state.insert("batteryLevel".to_string(), self.battery_level());
        Value::Object(state)
    }
}

// Manual impl: `B` itself does not need to be `Clone`.
impl<B> Clone for DriverContext<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            battery: self.battery.clone(),
        }
    }
}

impl<B> fmt::Debug for DriverContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("battery", &self.battery)
            .finish_non_exhaustive()
    }
}

/// State object reporting a failed read.
pub(crate) fn error_state(error: impl fmt::Display) -> Value {
    json!({ "error": error.to_string() })
}
