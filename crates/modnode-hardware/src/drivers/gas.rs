//! MQ-5 gas sensor behind a PCF8591 ADC.

use super::{DriverContext, error_state};
use crate::bus::Bus;
use crate::error::Result;
use modnode_core::BusAddress;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Control byte: analog channel 0, DAC output disabled.
pub const CONTROL_CHANNEL_0: u8 = 0x40;

const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// Convert an 8-bit PCF8591 sample to volts.
#[must_use]
pub fn gas_voltage(raw: u8) -> f64 {
    f64::from(raw) / 255.0 * ADC_REFERENCE_VOLTS
}

/// Gas sensor module.
#[derive(Debug)]
pub struct GasSensor<B> {
    ctx: DriverContext<B>,
    address: BusAddress,
}

impl<B: Bus> GasSensor<B> {
    /// Bind a driver to the ADC at `address`.
    pub fn new(ctx: DriverContext<B>, address: BusAddress) -> Self {
        Self { ctx, address }
    }

    /// Bus address of the ADC.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Sample channel 0.
    ///
    /// The PCF8591 returns the result of the previous conversion first, so one
    /// byte is read and discarded before the real sample.
    pub async fn sample(&self) -> Result<u8> {
        let mut bus = self.ctx.bus.lock().await;
        bus.write(self.address, &[CONTROL_CHANNEL_0]).await?;

        let mut buffer = [0u8; 1];
        bus.read(self.address, &mut buffer).await?;
        bus.read(self.address, &mut buffer).await?;
        Ok(buffer[0])
    }

    /// Current state: `{"gasValue", "voltage", "batteryLevel"}` or `{"error"}`.
    pub async fn read_state(&self) -> Value {
        match self.sample().await {
            Ok(raw) => {
                let voltage = gas_voltage(raw);
                debug!(address = %self.address, raw, voltage, "Gas sensor sampled");

                let mut fields = Map::new();
                fields.insert("gasValue".to_string(), json!(raw));
                fields.insert("voltage".to_string(), json!(voltage));
                self.ctx.state_with_battery(fields)
            }
            Err(e) => error_state(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryMonitor;
    use crate::bus;
    use crate::mock::MockBus;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0.0)]
    #[case(255, 3.3)]
    #[case(51, 0.66)]
    fn test_gas_voltage(#[case] raw: u8, #[case] expected: f64) {
        assert!((gas_voltage(raw) - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_read_state_samples_channel_0() {
        let (mock, handle) = MockBus::new();
        let address = BusAddress::new(0x4c).unwrap();
        handle.attach(address, vec![0x80]);
        let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
        let sensor = GasSensor::new(ctx, address);

        let state = sensor.read_state().await;
        assert_eq!(state["gasValue"], json!(128));
        assert_eq!(state["batteryLevel"], Value::Null);
        assert_eq!(handle.writes(address), vec![vec![CONTROL_CHANNEL_0]]);
    }

    #[tokio::test]
    async fn test_read_state_reports_error() {
        let (mock, _handle) = MockBus::new();
        let address = BusAddress::new(0x4c).unwrap();
        let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
        let sensor = GasSensor::new(ctx, address);

        let state = sensor.read_state().await;
        assert!(state["error"].as_str().unwrap().contains("0x4c"));
        assert!(state.get("gasValue").is_none());
    }
}
