//! Battery gauge.
//!
//! The node measures its supply through a resistor divider on an analog pin.
//! Every module reports the resulting charge level as `batteryLevel` next to its
//! own state; nodes without an ADC report `null`.

use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Full-scale voltage of the ADC reference.
const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// Divider ratio between the battery and the ADC pin.
const DIVIDER_RATIO: f64 = 3.2 / 2.2;

/// Voltage reported as 0 %.
const EMPTY_VOLTS: f64 = 3.0;

/// Voltage reported as 100 %.
const FULL_VOLTS: f64 = 4.2;

/// A 16-bit analog input.
pub trait AdcChannel: Send + Sync {
    /// Sample the channel, scaled to `0..=65535`.
    fn read_u16(&self) -> Result<u16>;
}

/// Convert a raw 16-bit sample into a battery voltage.
#[must_use]
pub fn battery_voltage(raw: u16) -> f64 {
    f64::from(raw) / 65535.0 * ADC_REFERENCE_VOLTS * DIVIDER_RATIO
}

/// Convert a raw 16-bit sample into a truncated charge percentage.
#[must_use]
pub fn battery_percentage(raw: u16) -> u8 {
    let fraction = (battery_voltage(raw) - EMPTY_VOLTS) / (FULL_VOLTS - EMPTY_VOLTS);
    (fraction * 100.0).clamp(0.0, 100.0) as u8
}

/// Shared battery gauge handed to every driver.
#[derive(Clone, Default)]
pub struct BatteryMonitor {
    channel: Option<Arc<dyn AdcChannel>>,
}

impl BatteryMonitor {
    /// Gauge reading from `channel`.
    pub fn new(channel: impl AdcChannel + 'static) -> Self {
        Self {
            channel: Some(Arc::new(channel)),
        }
    }

    /// Gauge for a node without an ADC.
    pub fn unavailable() -> Self {
        Self { channel: None }
    }

    /// Whether an ADC is wired.
    pub fn is_available(&self) -> bool {
        self.channel.is_some()
    }

    /// Current charge percentage, or `None` if unknown.
    pub fn percentage(&self) -> Option<u8> {
        let channel = self.channel.as_ref()?;
        match channel.read_u16() {
            Ok(raw) => Some(battery_percentage(raw)),
            Err(e) => {
                warn!(error = %e, "Battery sample failed");
                None
            }
        }
    }
}

impl fmt::Debug for BatteryMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatteryMonitor")
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdc;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(40_000, 0)]
    #[case(45_000, 24)]
    #[case(50_000, 55)]
    #[case(55_000, 85)]
    #[case(60_000, 100)]
    #[case(65_535, 100)]
    fn test_battery_percentage(#[case] raw: u16, #[case] expected: u8) {
        assert_eq!(battery_percentage(raw), expected);
    }

    #[test]
    fn test_battery_voltage_full_scale() {
        let volts = battery_voltage(u16::MAX);
        assert!((volts - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_monitor_without_adc() {
        let monitor = BatteryMonitor::unavailable();
        assert!(!monitor.is_available());
        assert_eq!(monitor.percentage(), None);
    }

    #[test]
    fn test_monitor_reads_shared_channel() {
        let adc = MockAdc::new(65_535);
        let monitor = BatteryMonitor::new(adc.clone());
        assert_eq!(monitor.percentage(), Some(100));

        adc.set_raw(0);
        assert_eq!(monitor.percentage(), Some(0));

        adc.set_failing(true);
        assert_eq!(monitor.percentage(), None);
    }
}
