//! Mock bus implementation for testing and development.
//!
//! [`MockBus`] simulates a set of devices sitting at bus addresses. The paired
//! [`MockBusHandle`] attaches and detaches devices, scripts their responses and
//! inspects what the drivers wrote, while the bus itself is owned by the node.

use crate::bus::Bus;
use crate::error::{HardwareError, Result};
use modnode_core::BusAddress;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A device attached to the mock bus.
#[derive(Debug, Clone, Default)]
struct SimulatedDevice {
    /// Bytes returned by a read when no register is selected.
    response: Vec<u8>,

    /// Per-register contents, selected by the first byte of the last write.
    registers: BTreeMap<u8, Vec<u8>>,

    /// Register pointer set by the last write.
    pointer: Option<u8>,

    /// Every write received, oldest first.
    writes: Vec<Vec<u8>>,

    /// When set, transfers fail although the device still shows up in scans.
    faulty: bool,
}

#[derive(Debug, Default)]
struct MockBusState {
    devices: BTreeMap<BusAddress, SimulatedDevice>,
    scan_fails: bool,
    scans: usize,
}

/// Mock bus for testing and development.
///
/// # Examples
///
/// ```
/// use modnode_hardware::bus::Bus;
/// use modnode_hardware::mock::MockBus;
/// use modnode_core::BusAddress;
///
/// #[tokio::main]
/// async fn main() -> modnode_hardware::Result<()> {
///     let (mut bus, handle) = MockBus::new();
///     let address = BusAddress::new(0x4f).unwrap();
///
///     handle.attach(address, vec![0x19, 0x60]);
///
///     let mut buffer = [0u8; 2];
///     bus.read(address, &mut buffer).await?;
///     assert_eq!(buffer, [0x19, 0x60]);
///
///     bus.write(address, &[0x00]).await?;
///     assert_eq!(handle.writes(address), vec![vec![0x00]]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    /// Create an empty mock bus.
    ///
    /// Returns a tuple of (MockBus, MockBusHandle) where the handle can be used
    /// to simulate devices being plugged in and out.
    pub fn new() -> (Self, MockBusHandle) {
        let state = Arc::new(Mutex::new(MockBusState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockBusHandle { state },
        )
    }

    fn lock(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bus for MockBus {
    async fn scan(&mut self) -> Result<Vec<BusAddress>> {
        let mut state = self.lock();
        state.scans += 1;

        if state.scan_fails {
            return Err(HardwareError::bus_unavailable("simulated bus fault"));
        }

        Ok(state.devices.keys().copied().collect())
    }

    async fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let device = state
            .devices
            .get_mut(&address)
            .ok_or_else(|| HardwareError::not_responding(address))?;

        if device.faulty {
            return Err(HardwareError::communication(format!(
                "simulated fault at {address}"
            )));
        }

        trace!(%address, ?bytes, "mock bus write");
        device.pointer = bytes.first().copied();
        device.writes.push(bytes.to_vec());
        Ok(())
    }

    async fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<()> {
        let state = self.lock();
        let device = state
            .devices
            .get(&address)
            .ok_or_else(|| HardwareError::not_responding(address))?;

        if device.faulty {
            return Err(HardwareError::communication(format!(
                "simulated fault at {address}"
            )));
        }

        let source = device
            .pointer
            .and_then(|register| device.registers.get(&register))
            .unwrap_or(&device.response);

        for (index, byte) in buffer.iter_mut().enumerate() {
            *byte = source.get(index).copied().unwrap_or(0);
        }
        Ok(())
    }
}

/// Handle for controlling a [`MockBus`].
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBusHandle {
    fn lock(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a device that answers reads with `response`.
    ///
    /// Re-attaching an address replaces the previous device.
    pub fn attach(&self, address: BusAddress, response: Vec<u8>) {
        self.lock().devices.insert(
            address,
            SimulatedDevice {
                response,
                ..SimulatedDevice::default()
            },
        );
    }

    /// Detach the device at `address`, if any.
    pub fn detach(&self, address: BusAddress) {
        self.lock().devices.remove(&address);
    }

    /// Replace the default read response of an attached device.
    pub fn set_response(&self, address: BusAddress, response: Vec<u8>) {
        if let Some(device) = self.lock().devices.get_mut(&address) {
            device.response = response;
        }
    }

    /// Script the contents of one register of an attached device.
    pub fn set_register(&self, address: BusAddress, register: u8, contents: Vec<u8>) {
        if let Some(device) = self.lock().devices.get_mut(&address) {
            device.registers.insert(register, contents);
        }
    }

    /// Make transfers to an attached device fail (or succeed again).
    pub fn set_faulty(&self, address: BusAddress, faulty: bool) {
        if let Some(device) = self.lock().devices.get_mut(&address) {
            device.faulty = faulty;
        }
    }

    /// Make every subsequent scan fail (or succeed again).
    pub fn fail_scan(&self, fail: bool) {
        self.lock().scan_fails = fail;
    }

    /// Writes received by the device at `address`, oldest first.
    pub fn writes(&self, address: BusAddress) -> Vec<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .map(|device| device.writes.clone())
            .unwrap_or_default()
    }

    /// Last write received by the device at `address`.
    pub fn last_write(&self, address: BusAddress) -> Option<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .and_then(|device| device.writes.last().cloned())
    }

    /// Addresses with a device attached, in ascending order.
    pub fn attached(&self) -> Vec<BusAddress> {
        self.lock().devices.keys().copied().collect()
    }

    /// Number of scans performed so far.
    pub fn scan_count(&self) -> usize {
        self.lock().scans
    }
}
