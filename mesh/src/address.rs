//! Node identity and its fixed-width wire tag
//!
//! A node is identified by a 32-bit host id and a 16-bit port. On the wire and
//! as the membership key it travels as a 6-byte [`AddressTag`]: the host id in
//! little-endian followed by the port in little-endian.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialized width of an [`AddressTag`] in bytes.
pub const ADDRESS_TAG_LEN: usize = 6;

/// Host id of the well-known introducer.
pub const BOOTSTRAP_HOST_ID: u32 = 1;
/// Port of the well-known introducer.
pub const BOOTSTRAP_PORT: u16 = 0;

/// Canonical identity of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub host_id: u32,
    pub port: u16,
}

impl NodeIdentity {
    pub const fn new(host_id: u32, port: u16) -> Self {
        Self { host_id, port }
    }

    /// The introducer every node knows a priori.
    pub const fn bootstrap() -> Self {
        Self::new(BOOTSTRAP_HOST_ID, BOOTSTRAP_PORT)
    }

    pub fn is_bootstrap(&self) -> bool {
        *self == Self::bootstrap()
    }

    pub fn tag(&self) -> AddressTag {
        AddressTag::encode(*self)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tag(), f)
    }
}

/// Fixed-width byte form of a [`NodeIdentity`]. Equality is byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AddressTag([u8; ADDRESS_TAG_LEN]);

impl AddressTag {
    /// All-zero placeholder tag.
    pub const NULL: AddressTag = AddressTag([0; ADDRESS_TAG_LEN]);

    pub fn encode(identity: NodeIdentity) -> Self {
        let mut bytes = [0u8; ADDRESS_TAG_LEN];
        bytes[..4].copy_from_slice(&identity.host_id.to_le_bytes());
        bytes[4..6].copy_from_slice(&identity.port.to_le_bytes());
        Self(bytes)
    }

    pub fn decode(&self) -> NodeIdentity {
        let host_id = u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        let port = u16::from_le_bytes([self.0[4], self.0[5]]);
        NodeIdentity { host_id, port }
    }

    pub const fn from_bytes(bytes: [u8; ADDRESS_TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; ADDRESS_TAG_LEN] {
        &self.0
    }

    /// True when every byte is zero, i.e. an uninitialized address.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AddressTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = u16::from_le_bytes([self.0[4], self.0[5]]);
        write!(
            f,
            "{}.{}.{}.{}:{}",
            self.0[0], self.0[1], self.0[2], self.0[3], port
        )
    }
}
