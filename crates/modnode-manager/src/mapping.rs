//! Address-to-kind mapping.
//!
//! The bus only tells the node *that* something answers at an address, not
//! what it is. The mapping supplies the missing half: which driver kind lives
//! at which address. It starts from the board defaults, can be extended from
//! configuration and at runtime, and is never persisted.

use modnode_core::{BusAddress, ModuleKind};
use std::collections::BTreeMap;

/// Board defaults as `(address, kind)`.
pub const DEFAULT_MAPPINGS: [(u8, ModuleKind); 4] = [
    (0x48, ModuleKind::Relay),
    (0x4C, ModuleKind::GasSensor),
    (0x49, ModuleKind::Led),
    (0x4F, ModuleKind::TemperatureSensor),
];

/// Address to kind lookup table.
///
/// # Examples
///
/// ```
/// use modnode_manager::AddressMapping;
/// use modnode_core::{BusAddress, ModuleKind};
///
/// let mut mapping = AddressMapping::default();
/// let relay = BusAddress::new(0x48).unwrap();
/// assert_eq!(mapping.kind_for(relay), Some(ModuleKind::Relay));
///
/// let extra = BusAddress::new(0x4a).unwrap();
/// mapping.insert(extra, ModuleKind::Led);
/// assert_eq!(mapping.addresses_for(ModuleKind::Led).count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMapping {
    entries: BTreeMap<BusAddress, ModuleKind>,
}

impl Default for AddressMapping {
    fn default() -> Self {
        DEFAULT_MAPPINGS
            .into_iter()
            .filter_map(|(raw, kind)| BusAddress::new(raw).ok().map(|address| (address, kind)))
            .collect()
    }
}

impl AddressMapping {
    /// Mapping without any entry.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Map `address` to `kind`, returning the kind it replaced.
    pub fn insert(&mut self, address: BusAddress, kind: ModuleKind) -> Option<ModuleKind> {
        self.entries.insert(address, kind)
    }

    pub fn kind_for(&self, address: BusAddress) -> Option<ModuleKind> {
        self.entries.get(&address).copied()
    }

    /// Addresses mapped to `kind`, ascending.
    pub fn addresses_for(&self, kind: ModuleKind) -> impl Iterator<Item = BusAddress> + '_ {
        self.entries
            .iter()
            .filter(move |(_, mapped)| **mapped == kind)
            .map(|(address, _)| *address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BusAddress, ModuleKind)> + '_ {
        self.entries.iter().map(|(address, kind)| (*address, *kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(BusAddress, ModuleKind)> for AddressMapping {
    fn from_iter<I: IntoIterator<Item = (BusAddress, ModuleKind)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(BusAddress, ModuleKind)> for AddressMapping {
    fn extend<I: IntoIterator<Item = (BusAddress, ModuleKind)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
