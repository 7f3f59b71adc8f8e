//! Passive identification of unmapped devices.
//!
//! When the scanner finds an address with no known kind it pokes a few common
//! ID registers and logs what comes back. Nothing is created from the result;
//! it only helps an operator add a mapping.

use crate::bus::{Bus, SharedBus};
use crate::error::Result;
use modnode_core::BusAddress;
use std::fmt;
use tracing::{debug, info};

/// Registers commonly holding a chip or manufacturer ID.
pub const ID_REGISTERS: [u8; 6] = [0x00, 0x0F, 0xFC, 0xFD, 0xFE, 0xFF];

/// Guess about what sits at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHint {
    /// Answers at 0x48 with a readable register 0x00.
    TemperatureSensor,
    /// Answers in 0x20..=0x23 with a readable register 0x00.
    IoExpander,
}

impl fmt::Display for DeviceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceHint::TemperatureSensor => write!(f, "possibly a temperature sensor"),
            DeviceHint::IoExpander => write!(f, "possibly an I/O expander or LED controller"),
        }
    }
}

/// Result of probing one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub address: BusAddress,
    /// First byte returned by a bare read.
    pub first_byte: u8,
    /// Readable ID registers and their contents, in read order.
    pub registers: Vec<(u8, u8)>,
    pub hint: Option<DeviceHint>,
}

/// Hint for a device that returned register 0x00.
#[must_use]
pub fn hint_for(address: BusAddress, register: u8) -> Option<DeviceHint> {
    if register != 0x00 {
        return None;
    }
    match address.as_u8() {
        0x48 => Some(DeviceHint::TemperatureSensor),
        0x20..=0x23 => Some(DeviceHint::IoExpander),
        _ => None,
    }
}

/// Identify the device at `address`.
///
/// # Errors
/// Fails only if the initial bare read fails. Unreadable ID registers are
/// skipped.
pub async fn identify<B: Bus>(bus: &SharedBus<B>, address: BusAddress) -> Result<Identification> {
    let mut bus = bus.lock().await;

    let mut buffer = [0u8; 1];
    bus.read(address, &mut buffer).await?;
    let first_byte = buffer[0];
    info!(%address, first_byte, "Unknown device responded");

    let mut registers = Vec::new();
    let mut hint = None;

    for register in ID_REGISTERS {
        if bus.write(address, &[register]).await.is_err() {
            continue;
        }
        if bus.read(address, &mut buffer).await.is_err() {
            continue;
        }

        debug!(%address, register, value = buffer[0], "ID register read");
        registers.push((register, buffer[0]));

        if hint.is_none()
            && let Some(guess) = hint_for(address, register)
        {
            info!(%address, "{guess}");
            hint = Some(guess);
        }
    }

    Ok(Identification {
        address,
        first_byte,
        registers,
        hint,
    })
}
