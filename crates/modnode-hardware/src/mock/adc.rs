//! Mock analog channel.

use crate::battery::AdcChannel;
use crate::error::{HardwareError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Analog channel whose raw reading is set by the test.
///
/// Clones share the same reading, so a test can keep one clone and hand the
/// other to a [`BatteryMonitor`](crate::battery::BatteryMonitor).
#[derive(Debug, Clone, Default)]
pub struct MockAdc {
    raw: Arc<AtomicU16>,
    fail: Arc<AtomicBool>,
}

impl MockAdc {
    /// Create a channel reporting `raw`.
    pub fn new(raw: u16) -> Self {
        let adc = Self::default();
        adc.set_raw(raw);
        adc
    }

    /// Change the reported raw value.
    pub fn set_raw(&self, raw: u16) {
        self.raw.store(raw, Ordering::SeqCst);
    }

    /// Make subsequent samples fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl AdcChannel for MockAdc {
    fn read_u16(&self) -> Result<u16> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HardwareError::adc("simulated ADC failure"));
        }
        Ok(self.raw.load(Ordering::SeqCst))
    }
}
