//! Simulated hardware for testing and development.
//!
//! This module provides a bus and an analog channel that can be controlled
//! programmatically without requiring physical hardware.

pub mod adc;
pub mod bus;

pub use adc::MockAdc;
pub use bus::{MockBus, MockBusHandle};
