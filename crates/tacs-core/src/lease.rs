//! Lease token and key material.
//!
//! A lease token grants a phone access to one SORC for the duration of a
//! lease. It carries the pre-shared AES key (hex encoded) used by the
//! handshake. The lease token blob is an opaque, platform-signed copy of the
//! token that the phone forwards to the SORC.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tacs_proto::SorcId;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    crypto::{AesCbc, KEY_SIZE},
    error::LeaseError,
};

/// Lease token issued by the secure access platform.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseToken {
    /// Lease token id
    pub id: String,
    /// Lease the token belongs to
    pub lease_id: String,
    /// SORC the token grants access to
    pub sorc_id: SorcId,
    /// Hex-encoded 16-byte pre-shared key
    pub sorc_access_key: String,
}

impl LeaseToken {
    /// Decode the pre-shared key.
    pub fn shared_key(&self) -> Result<SharedKey, LeaseError> {
        let mut raw = hex::decode(&self.sorc_access_key).map_err(|_| LeaseError::InvalidHex)?;
        let result = <[u8; KEY_SIZE]>::try_from(raw.as_slice())
            .map(SharedKey)
            .map_err(|_| LeaseError::InvalidKeyLength(raw.len()));
        raw.zeroize();
        result
    }
}

impl fmt::Debug for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseToken")
            .field("id", &self.id)
            .field("lease_id", &self.lease_id)
            .field("sorc_id", &self.sorc_id)
            .field("sorc_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Signed lease token blob forwarded to the SORC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseTokenBlob {
    /// Monotonic blob counter assigned by the platform
    pub message_counter: u32,
    /// Opaque blob bytes
    pub data: Bytes,
}

/// Pre-shared handshake key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Cipher keyed with this key.
    pub fn cipher(&self) -> AesCbc {
        AesCbc::new(self.0)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey([REDACTED])")
    }
}

/// Session key derived by the handshake.
///
/// `nr[0..4] ‖ nc[0..4] ‖ nr[12..16] ‖ nc[12..16]`
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Cipher keyed with this key.
    pub fn cipher(&self) -> AesCbc {
        AesCbc::new(self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}
