use crate::types::{BusAddress, ModuleKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Module lifecycle errors
    #[error("Unknown module kind: {0}")]
    UnknownKind(String),

    #[error("Bus address {0} is already in use")]
    AddressInUse(BusAddress),

    #[error("No free bus address for module kind {0}")]
    NoFreeAddress(ModuleKind),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Module {0} does not support state changes")]
    NotControllable(String),

    #[error("Invalid address: 0x{0:02x}")]
    InvalidAddress(u8),

    // Driver errors
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    // Persistence errors
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    // Coordinator errors
    #[error("Coordinator unreachable after {attempts} attempts")]
    CoordinatorUnreachable { attempts: u32 },
}

impl Error {
    /// Short machine-readable code, used by the HTTP layer and in logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "unknown_kind",
            Self::AddressInUse(_) => "address_in_use",
            Self::NoFreeAddress(_) => "no_free_address",
            Self::NotFound(_) => "not_found",
            Self::NotControllable(_) => "not_controllable",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidValue(_) => "invalid_value",
            Self::DeviceUnavailable(_) => "device_unavailable",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::CoordinatorUnreachable { .. } => "coordinator_unreachable",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
