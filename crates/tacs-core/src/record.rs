//! Message records.
//!
//! Before the handshake completes, records are plain [`SorcMessage`] wire
//! bytes. Afterwards every record is encrypted with the session key:
//!
//! ```text
//! plaintext = [id u8][payload_len u16 LE][payload][zero padding to 16]
//! record    = AES-128-CBC(session_key, plaintext)
//! ```
//!
//! The explicit length lets the receiver strip the padding.

use bytes::{BufMut, Bytes, BytesMut};
use tacs_proto::{SorcMessage, SorcMessageId};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, little_endian::U16};

use crate::{
    crypto::{AesCbc, BLOCK_SIZE},
    error::{CryptoError, SessionError},
    lease::SessionKey,
};

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RecordHeader {
    id: u8,
    payload_len: U16,
}

/// How records are protected on the link.
#[derive(Debug, Clone, Default)]
pub enum MessageCrypto {
    /// No session key yet
    #[default]
    Plain,
    /// Encrypted with the session key
    Aes(AesCbc),
}

impl MessageCrypto {
    /// Record protection for an established session.
    pub fn with_session_key(key: &SessionKey) -> Self {
        Self::Aes(key.cipher())
    }

    /// Whether records are encrypted.
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Aes(_))
    }

    /// Turn a message into a record.
    pub fn seal(&self, message: &SorcMessage) -> Result<Bytes, SessionError> {
        let Self::Aes(cipher) = self else {
            return Ok(message.encode());
        };

        let len = u16::try_from(message.payload.len())
            .map_err(|_| CryptoError::MalformedRecord("payload exceeds record length field"))?;
        let header = RecordHeader { id: message.id.to_u8(), payload_len: U16::new(len) };
        let unpadded = size_of::<RecordHeader>() + message.payload.len();
        let padded = unpadded.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;

        let mut plaintext = BytesMut::with_capacity(padded);
        plaintext.put_slice(header.as_bytes());
        plaintext.put_slice(&message.payload);
        plaintext.resize(padded, 0);

        Ok(Bytes::from(cipher.encrypt(&plaintext)?))
    }

    /// Turn a record back into a message.
    pub fn open(&self, record: &[u8]) -> Result<SorcMessage, SessionError> {
        let Self::Aes(cipher) = self else {
            return Ok(SorcMessage::decode(record)?);
        };

        let plaintext = cipher.decrypt(record)?;
        let (header, body) = RecordHeader::ref_from_prefix(&plaintext)
            .map_err(|_| CryptoError::MalformedRecord("record shorter than header"))?;
        let id = SorcMessageId::from_u8(header.id)?;
        let payload = body
            .get(..usize::from(header.payload_len.get()))
            .ok_or(CryptoError::MalformedRecord("declared length exceeds record"))?;

        Ok(SorcMessage::new(id, Bytes::copy_from_slice(payload)))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn aes() -> MessageCrypto {
        MessageCrypto::with_session_key(&SessionKey::new([0x5A; 16]))
    }

    #[test]
    fn plain_record_is_message_bytes() {
        let message = SorcMessage::new(SorcMessageId::ServiceGrant, vec![1, 0]);
        let record = MessageCrypto::Plain.seal(&message).unwrap();
        assert_eq!(record, message.encode());
        assert_eq!(MessageCrypto::Plain.open(&record).unwrap(), message);
    }

    #[test]
    fn encrypted_record_is_block_aligned_and_opaque() {
        let message = SorcMessage::new(SorcMessageId::ServiceGrant, vec![1, 0]);
        let record = aes().seal(&message).unwrap();
        assert_eq!(record.len(), 16);
        assert_ne!(&record[..3], &[0x01, 0x02, 0x00]);
        assert_eq!(aes().open(&record).unwrap(), message);
    }

    #[test]
    fn encrypted_record_rejects_wrong_key() {
        let message = SorcMessage::new(SorcMessageId::ServiceGrant, vec![1, 0]);
        let record = aes().seal(&message).unwrap();
        let other = MessageCrypto::with_session_key(&SessionKey::new([0x5B; 16]));
        assert_ne!(other.open(&record).ok(), Some(message));
    }

    #[test]
    fn encrypted_record_rejects_partial_block() {
        assert!(matches!(
            aes().open(&[0u8; 15]),
            Err(SessionError::Crypto(CryptoError::DecryptionFailed { len: 15 }))
        ));
    }

    proptest! {
        #[test]
        fn prop_encrypted_record_round_trip(payload in prop::collection::vec(any::<u8>(), 0..200)) {
            let message = SorcMessage::new(SorcMessageId::ServiceGrantTrigger, payload);
            let record = aes().seal(&message).unwrap();
            prop_assert_eq!(record.len() % BLOCK_SIZE, 0);
            prop_assert_eq!(aes().open(&record).unwrap(), message);
        }
    }
}
