//! Handshake records.

use bytes::{BufMut, Bytes, BytesMut};

use super::{BLOCK_SIZE, Reader, checked_len};
use crate::{Result, SorcId};

/// First handshake message (phone to SORC), carrying b0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneToSorcChallenge {
    /// Lease the token belongs to
    pub lease_id: String,
    /// Target SORC
    pub sorc_id: SorcId,
    /// Lease token id
    pub lease_token_id: String,
    /// b0, the encrypted phone nonce
    pub challenge: [u8; BLOCK_SIZE],
}

impl PhoneToSorcChallenge {
    /// Encode as `[len][lease_id][sorc_id][len][lease_token_id][challenge]`.
    pub fn encode(&self) -> Result<Bytes> {
        let lease_len = checked_len("lease id", &self.lease_id, u8::MAX as usize)?;
        let token_len = checked_len("lease token id", &self.lease_token_id, u8::MAX as usize)?;
        let mut buf =
            BytesMut::with_capacity(2 + lease_len + token_len + SorcId::SIZE + BLOCK_SIZE);
        buf.put_u8(lease_len as u8);
        buf.put_slice(self.lease_id.as_bytes());
        buf.put_slice(self.sorc_id.as_bytes());
        buf.put_u8(token_len as u8);
        buf.put_slice(self.lease_token_id.as_bytes());
        buf.put_slice(&self.challenge);
        Ok(buf.freeze())
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes, "challenge");
        let lease_len = r.u8()? as usize;
        let lease_id = r.string(lease_len, "lease id")?;
        let sorc_id = SorcId::from_bytes(r.array()?);
        let token_len = r.u8()? as usize;
        let lease_token_id = r.string(token_len, "lease token id")?;
        let challenge = r.array()?;
        Ok(Self { lease_id, sorc_id, lease_token_id, challenge })
    }
}

/// SORC answer carrying b1 and b2.
///
/// A payload shorter than two blocks decodes to empty blocks; the handshake
/// rejects those as corrupt instead of failing here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SorcToPhoneResponse {
    /// b1 = enc(nr)
    pub b1: Vec<u8>,
    /// b2 = enc(rotate(nc) xor b1)
    pub b2: Vec<u8>,
}

impl SorcToPhoneResponse {
    /// Build from two blocks.
    pub fn new(b1: [u8; BLOCK_SIZE], b2: [u8; BLOCK_SIZE]) -> Self {
        Self { b1: b1.to_vec(), b2: b2.to_vec() }
    }

    /// Whether both blocks are present.
    pub fn is_complete(&self) -> bool {
        self.b1.len() == BLOCK_SIZE && self.b2.len() == BLOCK_SIZE
    }

    /// Encode as `[b1][b2]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.b1.len() + self.b2.len());
        buf.put_slice(&self.b1);
        buf.put_slice(&self.b2);
        buf.freeze()
    }

    /// Decode; never fails.
    pub fn decode(bytes: &[u8]) -> Self {
        match (bytes.get(..BLOCK_SIZE), bytes.get(BLOCK_SIZE..2 * BLOCK_SIZE)) {
            (Some(b1), Some(b2)) => Self { b1: b1.to_vec(), b2: b2.to_vec() },
            _ => Self::default(),
        }
    }
}

/// Phone answer carrying b3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhoneToSorcResponse {
    /// b3 = enc(rotate(nr) xor b2)
    pub response: [u8; BLOCK_SIZE],
}

impl PhoneToSorcResponse {
    /// Encode as `[b3]`.
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.response)
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self { response: Reader::new(bytes, "phone response").array()? })
    }
}
