//! LM75B digital temperature sensor.

use super::{DriverContext, error_state};
use crate::bus::Bus;
use crate::error::Result;
use modnode_core::BusAddress;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Pointer value selecting the temperature register.
pub const TEMP_REGISTER: u8 = 0x00;

/// Decode an LM75B temperature register into degrees Celsius.
///
/// The reading is an 11-bit two's complement value left-aligned in two bytes,
/// 0.125 °C per LSB.
#[must_use]
pub fn lm75b_celsius(msb: u8, lsb: u8) -> f64 {
    let raw = ((u16::from(msb) << 8) | u16::from(lsb)) >> 5;
    let signed = if raw & 0x400 != 0 {
        i32::from(raw) - 0x800
    } else {
        i32::from(raw)
    };
    f64::from(signed) * 0.125
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Temperature sensor module.
#[derive(Debug)]
pub struct TemperatureSensor<B> {
    ctx: DriverContext<B>,
    address: BusAddress,
}

impl<B: Bus> TemperatureSensor<B> {
    /// Bind a driver to the sensor at `address`.
    pub fn new(ctx: DriverContext<B>, address: BusAddress) -> Self {
        Self { ctx, address }
    }

    /// Bus address of the sensor.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Read the temperature in degrees Celsius.
    pub async fn celsius(&self) -> Result<f64> {
        let mut bus = self.ctx.bus.lock().await;
        bus.write(self.address, &[TEMP_REGISTER]).await?;

        let mut buffer = [0u8; 2];
        bus.read(self.address, &mut buffer).await?;
        Ok(lm75b_celsius(buffer[0], buffer[1]))
    }

    /// Current state: `{"temperatureC", "batteryLevel"}` or `{"error"}`.
    pub async fn read_state(&self) -> Value {
        match self.celsius().await {
            Ok(celsius) => {
                debug!(address = %self.address, celsius, "Temperature read");

                let mut fields = Map::new();
                fields.insert("temperatureC".to_string(), json!(round2(celsius)));
                self.ctx.state_with_battery(fields)
            }
            Err(e) => error_state(e),
        }
    }
}
