//! Mesh addresses. Scalar addresses are 16-bit; label destinations carry a
//! full 128-bit UUID and are only ever exchanged in tagged form, never as a
//! bare scalar.
//!
//! | Bits (16)             | Type          |
//! | --------------------- | ------------- |
//! | 0b0000 0000 0000 0000 | Unassigned    |
//! | 0b0xxx xxxx xxxx xxxx | Unicast       |
//! | 0b11xx xxxx xxxx xxxx | Group         |
//!
//! The `0b10` prefix is reserved for label hashes; this client never accepts
//! it as a scalar destination (labels travel as [`Address::Label`]).
use crate::uuid::DeviceUuid;
use core::convert::TryFrom;
use core::fmt::{self, Display, Formatter};

pub const ADDRESS_LEN: usize = 2;

const UNICAST_BIT: u16 = 0x8000;
const GROUP_BITS: u16 = 0xC000;

/// Element unicast address. Each element has one unicast address assigned to
/// it by the provisioner.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct UnicastAddress(u16);
impl UnicastAddress {
    /// Creates a new `UnicastAddress`.
    /// # Panics
    /// Panics if `v` is not a valid unicast address (`v == 0 || v & 0x8000 != 0`).
    #[must_use]
    pub fn new(v: u16) -> UnicastAddress {
        match UnicastAddress::try_from(v) {
            Ok(u) => u,
            Err(_) => panic!("non unicast address '{}'", v),
        }
    }
}

/// Group address. `0xFFFF` addresses all nodes.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct GroupAddress(u16);
impl GroupAddress {
    /// # Panics
    /// Panics if `v` isn't a valid group address.
    #[must_use]
    pub fn new(v: u16) -> GroupAddress {
        match GroupAddress::try_from(v) {
            Ok(g) => g,
            Err(_) => panic!("non group address '{}'", v),
        }
    }
    #[must_use]
    pub const fn all_nodes() -> GroupAddress {
        GroupAddress(0xFFFF)
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct AddressError(pub ());

impl TryFrom<u16> for UnicastAddress {
    type Error = AddressError;

    fn try_from(v: u16) -> Result<UnicastAddress, AddressError> {
        if v == 0 || v & UNICAST_BIT != 0 {
            Err(AddressError(()))
        } else {
            Ok(UnicastAddress(v))
        }
    }
}
impl TryFrom<u16> for GroupAddress {
    type Error = AddressError;

    fn try_from(v: u16) -> Result<GroupAddress, AddressError> {
        if v & GROUP_BITS == GROUP_BITS {
            Ok(GroupAddress(v))
        } else {
            Err(AddressError(()))
        }
    }
}
impl From<UnicastAddress> for u16 {
    fn from(v: UnicastAddress) -> u16 {
        v.0
    }
}
impl From<GroupAddress> for u16 {
    fn from(v: GroupAddress) -> u16 {
        v.0
    }
}

/// Message destination. The tag (not the value) distinguishes a scalar
/// address from a 128-bit label, so the two can never be confused on the
/// wire.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub enum Address {
    Unassigned,
    Unicast(UnicastAddress),
    Group(GroupAddress),
    Label(DeviceUuid),
}

impl Address {
    /// Classifies a bare 16-bit scalar. Values with the reserved `0b10`
    /// prefix are rejected; label destinations must be supplied as full
    /// 128-bit labels instead.
    pub fn from_scalar(v: u16) -> Result<Address, AddressError> {
        if v == 0 {
            Ok(Address::Unassigned)
        } else if v & UNICAST_BIT == 0 {
            Ok(Address::Unicast(UnicastAddress(v)))
        } else if v & GROUP_BITS == GROUP_BITS {
            Ok(Address::Group(GroupAddress(v)))
        } else {
            Err(AddressError(()))
        }
    }
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Address::Unassigned)
    }
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        matches!(self, Address::Unicast(_))
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Address::Group(_))
    }
    #[must_use]
    pub fn unicast(&self) -> Option<UnicastAddress> {
        match self {
            Address::Unicast(u) => Some(*u),
            _ => None,
        }
    }
    #[must_use]
    pub fn group(&self) -> Option<GroupAddress> {
        match self {
            Address::Group(g) => Some(*g),
            _ => None,
        }
    }
}
impl Default for Address {
    fn default() -> Address {
        Address::Unassigned
    }
}
impl From<UnicastAddress> for Address {
    fn from(u: UnicastAddress) -> Address {
        Address::Unicast(u)
    }
}
impl From<GroupAddress> for Address {
    fn from(g: GroupAddress) -> Address {
        Address::Group(g)
    }
}
impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unassigned => write!(f, "0000"),
            Address::Unicast(u) => write!(f, "{:04x}", u.0),
            Address::Group(g) => write!(f, "{:04x}", g.0),
            Address::Label(uuid) => write!(f, "{}", uuid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_classification() {
        assert_eq!(Address::from_scalar(0), Ok(Address::Unassigned));
        assert_eq!(
            Address::from_scalar(0x0001),
            Ok(Address::Unicast(UnicastAddress(0x0001)))
        );
        assert_eq!(
            Address::from_scalar(0x7FFF),
            Ok(Address::Unicast(UnicastAddress(0x7FFF)))
        );
        assert_eq!(
            Address::from_scalar(0xC000),
            Ok(Address::Group(GroupAddress(0xC000)))
        );
        assert_eq!(
            Address::from_scalar(0xFFFF),
            Ok(Address::Group(GroupAddress(0xFFFF)))
        );
        // Reserved label-hash range is never a scalar destination.
        assert_eq!(Address::from_scalar(0x8000), Err(AddressError(())));
        assert_eq!(Address::from_scalar(0xBFFF), Err(AddressError(())));
    }
    #[test]
    #[should_panic]
    fn test_unicast_out_of_range() {
        let _ = UnicastAddress::new(0x8001);
    }
    #[test]
    fn test_destination_tags_are_unambiguous() {
        // A group scalar and a label must serialize with distinct tags even
        // if the label bytes could be misread as a scalar.
        let group = serde_json::to_value(Address::Group(GroupAddress::all_nodes())).unwrap();
        let label = serde_json::to_value(Address::Label(DeviceUuid::new([0xFF; 16]))).unwrap();
        assert!(group.get("Group").is_some());
        assert!(label.get("Label").is_some());
        let back: Address = serde_json::from_value(label).unwrap();
        assert_eq!(back, Address::Label(DeviceUuid::new([0xFF; 16])));
    }
}
