//! Core constants for the peripheral node.
//!
//! Values shared between the hardware layer, the lifecycle manager and the
//! network layer. Keeping them in one place means the scanner, the reporter
//! and the HTTP server agree on timing and wire defaults without passing
//! configuration through every crate.
//!
//! # Usage
//!
//! ```
//! use modnode_core::constants::*;
//! use std::time::Duration;
//!
//! let interval = Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS);
//! assert!(interval.as_millis() >= MIN_SCAN_INTERVAL_MS as u128);
//! ```

// ============================================================================
// Bus
// ============================================================================

/// Lowest non-reserved 7-bit bus address.
///
/// Addresses `0x00..=0x07` are reserved by the I²C specification (general
/// call, CBUS, high-speed master codes) and are never scanned.
pub const MIN_BUS_ADDRESS: u8 = 0x08;

/// Highest non-reserved 7-bit bus address.
///
/// Addresses `0x78..=0x7F` are reserved for 10-bit addressing and future use.
pub const MAX_BUS_ADDRESS: u8 = 0x77;

/// Default interval between two bus scans in milliseconds.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;

/// Lower bound for the scan interval in milliseconds.
///
/// Shorter intervals saturate the bus with scan traffic and starve driver
/// reads.
pub const MIN_SCAN_INTERVAL_MS: u64 = 100;

// ============================================================================
// Identity
// ============================================================================

/// Length of a module identity in hexadecimal characters (64 random bits).
pub const IDENTITY_HEX_LEN: usize = 16;

// ============================================================================
// Coordinator reporting
// ============================================================================

/// Default coordinator TCP port.
pub const DEFAULT_COORDINATOR_PORT: u16 = 5002;

/// Default coordinator endpoint receiving the module inventory.
pub const DEFAULT_REPORT_PATH: &str = "/rasberry/Peripheral/refreshPeripherals";

/// Default number of report attempts before the node gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between two report attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Default timeout for each network operation (connect, write, read).
pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 3000;

// ============================================================================
// Local HTTP API
// ============================================================================

/// Default port of the local HTTP API.
///
/// Also used to build the callback URL sent to the coordinator.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Largest request body the local HTTP API accepts, in bytes.
pub const MAX_REQUEST_BODY: usize = 16 * 1024;

// ============================================================================
// Persistence
// ============================================================================

/// File name of the module registry document.
pub const REGISTRY_FILE_NAME: &str = "modules.json";

/// File name of the persisted network credentials.
pub const CREDENTIALS_FILE_NAME: &str = "wifi_credentials.json";
