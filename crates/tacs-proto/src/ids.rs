//! Identifiers shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ProtocolError, Result};

/// The ID that specifies the type of a service grant (unlock, lock, ...).
///
/// Encoded little-endian on the wire.
pub type ServiceGrantId = u16;

/// Identifier of a SORC (the in-vehicle access module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SorcId(Uuid);

impl SorcId {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Wrap a UUID.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Build from the 16 raw bytes used on the wire.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse from a slice, which must hold at least 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 16] = bytes
            .get(..Self::SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::Truncated {
                context: "sorc id",
                expected: Self::SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(raw))
    }

    /// Raw wire bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Underlying UUID.
    pub const fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for SorcId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SorcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
