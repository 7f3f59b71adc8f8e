//! [`Bus`] adapter for `embedded-hal` I²C peripherals.
//!
//! Any blocking `embedded_hal::i2c::I2c` implementation (Linux `i2cdev`,
//! esp-hal, rp-hal, ...) becomes a node bus by wrapping it in [`HalBus`].
//! Enumeration sends an empty write to each non-reserved address, the same
//! check `i2cdetect -q` performs.

use crate::bus::Bus;
use crate::error::{HardwareError, Result};
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use modnode_core::BusAddress;
use tracing::trace;

/// Bus backed by an `embedded-hal` I²C peripheral.
#[derive(Debug)]
pub struct HalBus<I> {
    i2c: I,
}

impl<I> HalBus<I> {
    /// Wrap an I²C peripheral.
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Release the wrapped peripheral.
    pub fn into_inner(self) -> I {
        self.i2c
    }
}

fn map_error(address: BusAddress, kind: ErrorKind) -> HardwareError {
    match kind {
        ErrorKind::NoAcknowledge(_) => HardwareError::not_responding(address),
        other => HardwareError::communication(format!("{other:?} at {address}")),
    }
}

impl<I> Bus for HalBus<I>
where
    I: I2c + Send + 'static,
{
    async fn scan(&mut self) -> Result<Vec<BusAddress>> {
        let mut found = Vec::new();

        for address in BusAddress::all() {
            match self.i2c.write(address.as_u8(), &[]) {
                Ok(()) => found.push(address),
                Err(e) => match e.kind() {
                    ErrorKind::NoAcknowledge(_) => {}
                    other => {
                        return Err(HardwareError::bus_unavailable(format!(
                            "address check of {address} failed: {other:?}"
                        )));
                    }
                },
            }
        }

        trace!(count = found.len(), "HAL bus scan complete");
        Ok(found)
    }

    async fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()> {
        self.i2c
            .write(address.as_u8(), bytes)
            .map_err(|e| map_error(address, e.kind()))
    }

    async fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<()> {
        self.i2c
            .read(address.as_u8(), buffer)
            .map_err(|e| map_error(address, e.kind()))
    }
}
