//! Dimmable LED driven by a PWM controller.
//!
//! Brightness is a percentage in `0..=100`. The controller takes an 8-bit duty
//! cycle through the `SET_PWM` command: `[0x01, duty]`.

use super::DriverContext;
use crate::bus::Bus;
use modnode_core::{BusAddress, Error};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Command byte selecting the PWM duty register.
pub const CMD_SET_PWM: u8 = 0x01;

/// Convert a brightness percentage into an 8-bit duty cycle (truncating).
#[must_use]
pub fn brightness_to_pwm(percent: f64) -> u8 {
    (percent.clamp(0.0, 100.0) / 100.0 * 255.0) as u8
}

/// Parse a requested brightness, clamped to `0..=100`.
///
/// Accepts JSON numbers and numeric strings.
///
/// # Errors
/// Returns `Error::InvalidValue` for anything else.
pub fn parse_brightness(value: &Value) -> modnode_core::Result<f64> {
    let percent = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite())
    .ok_or_else(|| Error::InvalidValue(format!("Invalid brightness: {value}")))?;

    Ok(percent.clamp(0.0, 100.0))
}

/// LED module.
#[derive(Debug)]
pub struct Led<B> {
    ctx: DriverContext<B>,
    address: BusAddress,
    brightness: f64,
}

impl<B: Bus> Led<B> {
    /// Bind a driver to the LED at `address`. The LED starts at 0 %.
    pub fn new(ctx: DriverContext<B>, address: BusAddress) -> Self {
        Self {
            ctx,
            address,
            brightness: 0.0,
        }
    }

    /// Bus address of the controller.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Last brightness successfully written.
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Current state: `{"brightness", "batteryLevel"}`.
    pub fn read_state(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("brightness".to_string(), json!(self.brightness));
        self.ctx.state_with_battery(fields)
    }

    /// Set the brightness and return the new state.
    ///
    /// The stored brightness only changes once the controller accepted it.
    pub async fn apply_state(&mut self, value: &Value) -> modnode_core::Result<Value> {
        let percent = parse_brightness(value)?;
        self.write_brightness(percent).await?;
        Ok(self.read_state())
    }

    /// Turn the LED off.
    pub async fn deactivate(&mut self) -> modnode_core::Result<()> {
        self.write_brightness(0.0).await
    }

    async fn write_brightness(&mut self, percent: f64) -> modnode_core::Result<()> {
        let pwm = brightness_to_pwm(percent);
        let result = self
            .ctx
            .bus
            .lock()
            .await
            .write(self.address, &[CMD_SET_PWM, pwm])
            .await;

        match result {
            Ok(()) => {
                self.brightness = percent;
                debug!(address = %self.address, percent, pwm, "LED brightness set");
                Ok(())
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "Failed to set LED brightness");
                Err(e.into())
            }
        }
    }
}
