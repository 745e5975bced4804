//! Service grant records.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, little_endian::U16};

use super::{Reader, checked_len};
use crate::{Result, ServiceGrantId};

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RequestWire {
    service_grant_id: U16,
}

/// Fixed part of a trigger; `data_len` bytes of UTF-8 follow.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct TriggerPrefix {
    service_grant_id: U16,
    status: u8,
    data_len: U16,
}

/// Phone request to execute a service grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceGrantRequest {
    /// Grant to execute
    pub service_grant_id: ServiceGrantId,
}

impl ServiceGrantRequest {
    /// Encode as `[id u16]`.
    pub fn encode(&self) -> Bytes {
        let wire = RequestWire { service_grant_id: U16::new(self.service_grant_id) };
        Bytes::copy_from_slice(wire.as_bytes())
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: RequestWire = Reader::new(bytes, "service grant").read()?;
        Ok(Self { service_grant_id: wire.service_grant_id.get() })
    }
}

/// SORC report on a service grant.
///
/// `status` stays a raw byte here; the core maps it to a typed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGrantTrigger {
    /// Grant the report belongs to
    pub service_grant_id: ServiceGrantId,
    /// Raw status byte
    pub status: u8,
    /// Free-form result text
    pub response_data: String,
}

impl ServiceGrantTrigger {
    /// Encode as `[id u16][status u8][len u16][data]`.
    pub fn encode(&self) -> Result<Bytes> {
        let len = checked_len("response data", &self.response_data, u16::MAX as usize)?;
        let prefix = TriggerPrefix {
            service_grant_id: U16::new(self.service_grant_id),
            status: self.status,
            data_len: U16::new(len as u16),
        };
        let mut buf = BytesMut::with_capacity(size_of::<TriggerPrefix>() + len);
        buf.put_slice(prefix.as_bytes());
        buf.put_slice(self.response_data.as_bytes());
        Ok(buf.freeze())
    }

    /// Decode from a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes, "service grant trigger");
        let prefix: TriggerPrefix = r.read()?;
        let response_data = r.string(usize::from(prefix.data_len.get()), "response data")?;
        Ok(Self {
            service_grant_id: prefix.service_grant_id.get(),
            status: prefix.status,
            response_data,
        })
    }
}
