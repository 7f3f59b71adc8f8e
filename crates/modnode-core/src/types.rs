use crate::{
    Result,
    constants::{IDENTITY_HEX_LEN, MAX_BUS_ADDRESS, MIN_BUS_ADDRESS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Address of a device on the shared bus (7-bit, non-reserved range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusAddress(u8);

impl BusAddress {
    /// Create a new bus address with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` if the address is outside `0x08..=0x77`.
    pub fn new(address: u8) -> Result<Self> {
        if !(MIN_BUS_ADDRESS..=MAX_BUS_ADDRESS).contains(&address) {
            return Err(Error::InvalidAddress(address));
        }
        Ok(BusAddress(address))
    }

    /// Get the raw address as u8.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Iterate over every scannable address in ascending order.
    pub fn all() -> impl Iterator<Item = BusAddress> {
        (MIN_BUS_ADDRESS..=MAX_BUS_ADDRESS).map(BusAddress)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        BusAddress::new(value)
    }
}

impl From<BusAddress> for u8 {
    fn from(address: BusAddress) -> Self {
        address.0
    }
}

impl std::str::FromStr for BusAddress {
    type Err = Error;

    /// Accepts decimal (`72`) and hexadecimal (`0x48`) notation.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => s.parse::<u8>(),
        };
        let value = parsed.map_err(|_| Error::InvalidValue(format!("Invalid bus address: {s}")))?;
        BusAddress::new(value)
    }
}

/// Capability class of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Read-only module.
    Sensor,
    /// Module whose state can be written.
    Control,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Sensor => write!(f, "Sensor"),
            Role::Control => write!(f, "Control"),
        }
    }
}

/// Driver type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Led,
    Relay,
    GasSensor,
    TemperatureSensor,
}

impl ModuleKind {
    /// Every supported kind.
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::Led,
        ModuleKind::Relay,
        ModuleKind::GasSensor,
        ModuleKind::TemperatureSensor,
    ];

    /// Capability class of modules of this kind.
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            ModuleKind::Led | ModuleKind::Relay => Role::Control,
            ModuleKind::GasSensor | ModuleKind::TemperatureSensor => Role::Sensor,
        }
    }

    /// Canonical tag, as persisted and reported to the coordinator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Led => "Led",
            ModuleKind::Relay => "Relay",
            ModuleKind::GasSensor => "GasSensor",
            ModuleKind::TemperatureSensor => "TemperatureSensor",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = Error;

    /// Case-insensitive match on the canonical tag.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ModuleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownKind(wanted.to_string()))
    }
}

/// Stable opaque module identity.
///
/// Generated identities are 16 lowercase hexadecimal characters (64 random
/// bits). Identities loaded from storage are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an existing identity.
    ///
    /// # Errors
    /// Returns `Error::InvalidValue` if the identity is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidValue("Module identity must not be empty".to_string()));
        }
        Ok(ModuleId(id))
    }

    /// Generate a fresh random identity.
    ///
    /// Both halves of a v4 UUID are folded together so that the fixed
    /// version and variant bits do not reduce the entropy of the result.
    #[must_use]
    pub fn generate() -> Self {
        let (high, low) = Uuid::new_v4().as_u64_pair();
        ModuleId(format!("{:0width$x}", high ^ low, width = IDENTITY_HEX_LEN))
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ModuleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ModuleId::new(s)
    }
}

/// Snapshot of a live module, safe to hand out of the manager lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    #[serde(rename = "uuid")]
    pub id: ModuleId,
    pub kind: ModuleKind,
    pub address: BusAddress,
    pub role: Role,
}
