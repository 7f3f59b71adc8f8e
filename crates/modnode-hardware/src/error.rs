//! Error types for bus and driver operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during bus and device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No device acknowledged the given address.
    #[error("No device responding at {address}")]
    NotResponding { address: String },

    /// The bus itself could not be used.
    #[error("Bus unavailable: {message}")]
    BusUnavailable { message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Analog channel could not be sampled.
    #[error("ADC error: {message}")]
    Adc { message: String },
}

impl HardwareError {
    /// Create a new not-responding error.
    pub fn not_responding(address: impl ToString) -> Self {
        Self::NotResponding {
            address: address.to_string(),
        }
    }

    /// Create a new bus unavailable error.
    pub fn bus_unavailable(message: impl Into<String>) -> Self {
        Self::BusUnavailable {
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new ADC error.
    pub fn adc(message: impl Into<String>) -> Self {
        Self::Adc {
            message: message.into(),
        }
    }
}

/// Every bus-level failure surfaces to callers as an unavailable device.
impl From<HardwareError> for modnode_core::Error {
    fn from(error: HardwareError) -> Self {
        modnode_core::Error::DeviceUnavailable(error.to_string())
    }
}
