//! Shared bus abstraction.
//!
//! The node talks to every attached module through one addressable bus. This
//! module defines the [`Bus`] contract used by the scanner (enumeration) and by
//! the drivers (register reads and writes), and the [`SharedBus`] handle that
//! serializes access between them.
//!
//! All methods return `impl Future + Send` so that generic code holding a
//! [`SharedBus`] can be spawned onto a multi-threaded Tokio runtime.
//! Implementations are free to write them as plain `async fn`.
//!
//! # Examples
//!
//! ```
//! use modnode_hardware::bus::{self, Bus};
//! use modnode_hardware::mock::MockBus;
//! use modnode_core::BusAddress;
//!
//! #[tokio::main]
//! async fn main() -> modnode_hardware::Result<()> {
//!     let (mock, handle) = MockBus::new();
//!     handle.attach(BusAddress::new(0x48).unwrap(), vec![0x00]);
//!
//!     let shared = bus::shared(mock);
//!     let found = shared.lock().await.scan().await?;
//!     assert_eq!(found, vec![BusAddress::new(0x48).unwrap()]);
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use modnode_core::BusAddress;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Addressable hardware bus (I²C-like).
pub trait Bus: Send + 'static {
    /// Enumerate every address that acknowledges its address, in ascending order.
    fn scan(&mut self) -> impl Future<Output = Result<Vec<BusAddress>>> + Send;

    /// Write `bytes` to the device at `address`.
    fn write(
        &mut self,
        address: BusAddress,
        bytes: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fill `buffer` with bytes read from the device at `address`.
    fn read(
        &mut self,
        address: BusAddress,
        buffer: &mut [u8],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Handle to the single bus instance of the node.
///
/// The scanner owns one clone and every live module holds another. The
/// mutex guarantees that enumeration and driver transfers never interleave.
pub type SharedBus<B> = Arc<Mutex<B>>;

/// Wrap a bus into a [`SharedBus`] handle.
pub fn shared<B: Bus>(bus: B) -> SharedBus<B> {
    Arc::new(Mutex::new(bus))
}
