//! SORC messages: a one-byte id followed by a kind-specific payload.

use bytes::{BufMut, Bytes, BytesMut};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{ProtocolError, Result};

/// Message ids.
///
/// Ids are fixed by the SORC firmware. Unknown ids are rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SorcMessageId {
    /// Phone requests a service grant
    ServiceGrant = 0x01,
    /// SORC reports the outcome of a service grant
    ServiceGrantTrigger = 0x02,
    /// Phone transfers the lease token blob
    LtBlob = 0x03,
    /// SORC accepted the lease token blob
    LtAck = 0x04,
    /// Phone starts the challenge (b0)
    ChallengePhone = 0x05,
    /// SORC answers the challenge (b1, b2)
    ChallengeSorcResponse = 0x06,
    /// Phone answers the SORC challenge (b3)
    ChallengePhoneResponse = 0x07,
    /// SORC could not verify the phone (asks for the blob)
    BadChallengeSorcResponse = 0x08,
    /// Phone could not verify the SORC
    BadChallengePhoneResponse = 0x09,
    /// Phone asks for the negotiated MTU
    MtuRequest = 0x30,
    /// SORC reports the negotiated MTU
    MtuReceive = 0x31,
    /// Keep-alive request
    HeartbeatRequest = 0x40,
    /// Keep-alive response
    HeartbeatResponse = 0x41,
}

impl SorcMessageId {
    /// Wire byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse the wire byte.
    pub const fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            0x01 => Self::ServiceGrant,
            0x02 => Self::ServiceGrantTrigger,
            0x03 => Self::LtBlob,
            0x04 => Self::LtAck,
            0x05 => Self::ChallengePhone,
            0x06 => Self::ChallengeSorcResponse,
            0x07 => Self::ChallengePhoneResponse,
            0x08 => Self::BadChallengeSorcResponse,
            0x09 => Self::BadChallengePhoneResponse,
            0x30 => Self::MtuRequest,
            0x31 => Self::MtuReceive,
            0x40 => Self::HeartbeatRequest,
            0x41 => Self::HeartbeatResponse,
            other => return Err(ProtocolError::UnknownMessageId(other)),
        })
    }

    /// Whether this message belongs to the challenge-response handshake.
    pub const fn is_challenge(self) -> bool {
        matches!(
            self,
            Self::LtAck
                | Self::ChallengePhone
                | Self::ChallengeSorcResponse
                | Self::ChallengePhoneResponse
                | Self::BadChallengeSorcResponse
                | Self::BadChallengePhoneResponse
        )
    }
}

/// One application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SorcMessage {
    /// Message kind
    pub id: SorcMessageId,
    /// Kind-specific payload record
    pub payload: Bytes,
}

impl SorcMessage {
    /// Create a message.
    pub fn new(id: SorcMessageId, payload: impl Into<Bytes>) -> Self {
        Self { id, payload: payload.into() }
    }

    /// Create a message without payload.
    pub fn empty(id: SorcMessageId) -> Self {
        Self { id, payload: Bytes::new() }
    }

    /// Encode as `[id][payload]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.id.to_u8());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode `[id][payload]`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&id, payload) = bytes.split_first().ok_or(ProtocolError::Truncated {
            context: "message id",
            expected: 1,
            actual: 0,
        })?;
        Ok(Self { id: SorcMessageId::from_u8(id)?, payload: Bytes::copy_from_slice(payload) })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_prefixes_id() {
        let message = SorcMessage::new(SorcMessageId::ServiceGrant, vec![0x02, 0x00]);
        assert_eq!(message.encode().as_ref(), hex!("01 02 00"));
    }

    #[test]
    fn decode_empty_fails() {
        assert!(matches!(SorcMessage::decode(&[]), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn decode_unknown_id_fails() {
        assert_eq!(SorcMessage::decode(&[0x7F, 1, 2]), Err(ProtocolError::UnknownMessageId(0x7F)));
    }

    #[test]
    fn every_id_parses_back() {
        for byte in 0..=u8::MAX {
            if let Ok(id) = SorcMessageId::from_u8(byte) {
                assert_eq!(id.to_u8(), byte);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = SorcMessage::decode(&bytes);
        }
    }
}
