//! Lease token blob transfer and MTU negotiation records.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

use super::Reader;
use crate::Result;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct MtuWire {
    mtu: U16,
}

/// SORC request for the lease token blob.
///
/// Carries the counter of the newest blob the SORC has seen, when it knows one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobRequest {
    /// Latest blob message counter known to the SORC
    pub blob_message_counter: Option<u32>,
}

impl BlobRequest {
    /// Encode; an unknown counter encodes as an empty payload.
    pub fn encode(&self) -> Bytes {
        match self.blob_message_counter {
            Some(counter) => Bytes::copy_from_slice(U32::new(counter).as_bytes()),
            None => Bytes::new(),
        }
    }

    /// Decode; payloads shorter than four bytes carry no counter.
    pub fn decode(bytes: &[u8]) -> Self {
        let blob_message_counter =
            Reader::new(bytes, "blob request").read::<U32>().ok().map(U32::get);
        Self { blob_message_counter }
    }
}

/// Lease token blob sent to the SORC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LtBlobPayload {
    /// Blob message counter
    pub message_counter: u32,
    /// Opaque signed blob
    pub blob: Bytes,
}

impl LtBlobPayload {
    /// Encode as `[counter u32][blob]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.blob.len());
        buf.put_slice(U32::new(self.message_counter).as_bytes());
        buf.put_slice(&self.blob);
        buf.freeze()
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes, "lease token blob");
        let message_counter = r.read::<U32>()?.get();
        Ok(Self { message_counter, blob: Bytes::copy_from_slice(r.rest()) })
    }
}

/// SORC answer to an MTU request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuReceive {
    /// Largest transport write the SORC accepts
    pub mtu: u16,
}

impl MtuReceive {
    /// Encode as `[mtu u16]`.
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(MtuWire { mtu: U16::new(self.mtu) }.as_bytes())
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: MtuWire = Reader::new(bytes, "mtu").read()?;
        Ok(Self { mtu: wire.mtu.get() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_request_counter_is_optional() {
        assert_eq!(BlobRequest::decode(&[]).blob_message_counter, None);
        assert_eq!(BlobRequest::decode(&[1, 2, 3]).blob_message_counter, None);
        assert_eq!(BlobRequest::decode(&[7, 0, 0, 0]).blob_message_counter, Some(7));
    }

    #[test]
    fn blob_payload_layout() {
        let payload = LtBlobPayload { message_counter: 0x0102_0304, blob: Bytes::from_static(b"blob") };
        let encoded = payload.encode();
        assert_eq!(encoded.as_ref(), b"\x04\x03\x02\x01blob");
        assert_eq!(LtBlobPayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn mtu_truncated() {
        assert!(MtuReceive::decode(&[0x14]).is_err());
        assert_eq!(MtuReceive::decode(&[0x14, 0x00]).unwrap().mtu, 20);
    }
}
