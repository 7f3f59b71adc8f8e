//! Single-channel relay.
//!
//! The relay board takes `[0x50, 0xFF]` to energize the coil and
//! `[0x50, 0x00]` to release it. It is driven off when the driver is bound;
//! a board that does not acknowledge that write is not bound at all.

use super::DriverContext;
use crate::bus::Bus;
use modnode_core::{BusAddress, Error};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

/// Command byte selecting the relay output.
pub const CMD_SET_RELAY: u8 = 0x50;

/// Output level written for "on".
pub const RELAY_HIGH: u8 = 0xFF;

/// Output level written for "off".
pub const RELAY_LOW: u8 = 0x00;

/// Parse a requested relay state.
///
/// Accepts booleans, numbers (non-zero is on) and the strings
/// `on`/`off`, `true`/`false`, `high`/`low`, `1`/`0`.
///
/// # Errors
/// Returns `Error::InvalidValue` for anything else.
pub fn parse_relay_state(value: &Value) -> modnode_core::Result<bool> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "high" | "1" => Some(true),
            "off" | "false" | "low" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };

    parsed.ok_or_else(|| Error::InvalidValue(format!("Invalid relay state: {value}")))
}

/// Relay module.
#[derive(Debug)]
pub struct Relay<B> {
    ctx: DriverContext<B>,
    address: BusAddress,
    on: bool,
}

impl<B: Bus> Relay<B> {
    /// Bind a driver to the relay at `address`.
    ///
    /// Call [`initialize`](Self::initialize) to drive the output off.
    pub fn new(ctx: DriverContext<B>, address: BusAddress) -> Self {
        Self {
            ctx,
            address,
            on: false,
        }
    }

    /// Bus address of the relay board.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Last output level successfully written.
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Drive the relay off.
    ///
    /// # Errors
    /// `DeviceUnavailable` when the board does not take the write.
    pub async fn initialize(&mut self) -> modnode_core::Result<()> {
        self.write_output(false).await.inspect_err(|e| {
            warn!(address = %self.address, error = %e, "Relay not driven off at init");
        })
    }

    /// Current state: `{"isOn", "batteryLevel"}`.
    pub fn read_state(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("isOn".to_string(), json!(self.on));
        self.ctx.state_with_battery(fields)
    }

    /// Switch the relay and return the new state.
    pub async fn apply_state(&mut self, value: &Value) -> modnode_core::Result<Value> {
        let on = parse_relay_state(value)?;
        self.write_output(on).await?;
        Ok(self.read_state())
    }

    /// Release the relay.
    pub async fn deactivate(&mut self) -> modnode_core::Result<()> {
        self.write_output(false).await
    }

    async fn write_output(&mut self, on: bool) -> modnode_core::Result<()> {
        let level = if on { RELAY_HIGH } else { RELAY_LOW };
        self.ctx
            .bus
            .lock()
            .await
            .write(self.address, &[CMD_SET_RELAY, level])
            .await?;

        self.on = on;
        info!(address = %self.address, on, "Relay switched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryMonitor;
    use crate::bus;
    use crate::mock::{MockBus, MockBusHandle};
    use rstest::rstest;

    fn setup() -> (Relay<MockBus>, MockBusHandle, BusAddress) {
        let (mock, handle) = MockBus::new();
        let address = BusAddress::new(0x48).unwrap();
        handle.attach(address, vec![]);
        let ctx = DriverContext::new(bus::shared(mock), BatteryMonitor::unavailable());
        (Relay::new(ctx, address), handle, address)
    }

    #[rstest]
    #[case(json!(true), true)]
    #[case(json!(false), false)]
    #[case(json!(1), true)]
    #[case(json!(0), false)]
    #[case(json!("ON"), true)]
    #[case(json!("off"), false)]
    #[case(json!("high"), true)]
    #[case(json!("0"), false)]
    fn test_parse_relay_state(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(parse_relay_state(&value).unwrap(), expected);
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!("maybe"))]
    #[case(json!([1]))]
    fn test_parse_relay_state_rejects(#[case] value: Value) {
        assert!(matches!(
            parse_relay_state(&value),
            Err(Error::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_drives_off() {
        let (mut relay, handle, address) = setup();
        relay.initialize().await.unwrap();
        assert_eq!(handle.writes(address), vec![vec![CMD_SET_RELAY, RELAY_LOW]]);
        assert!(!relay.is_on());
    }

    #[tokio::test]
    async fn test_apply_state_switches_output() {
        let (mut relay, handle, address) = setup();

        let state = relay.apply_state(&json!(true)).await.unwrap();
        assert_eq!(state, json!({"isOn": true, "batteryLevel": null}));
        assert_eq!(
            handle.last_write(address),
            Some(vec![CMD_SET_RELAY, RELAY_HIGH])
        );

        relay.deactivate().await.unwrap();
        assert!(!relay.is_on());
        assert_eq!(
            handle.last_write(address),
            Some(vec![CMD_SET_RELAY, RELAY_LOW])
        );
    }

    #[tokio::test]
    async fn test_apply_state_on_detached_device() {
        let (mut relay, handle, address) = setup();
        handle.detach(address);

        let result = relay.apply_state(&json!("on")).await;
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
        assert!(!relay.is_on());
    }

    #[tokio::test]
    async fn test_initialize_fails_without_board() {
        let (mut relay, handle, address) = setup();
        handle.detach(address);

        let result = relay.initialize().await;
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }
}
