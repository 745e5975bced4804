//! Payload records carried inside [`SorcMessage`](crate::SorcMessage)s.
//!
//! Records are fixed binary layouts with little-endian integers and
//! length-prefixed UTF-8 strings. Each record has `encode() -> Bytes` and
//! `decode(&[u8]) -> Result<Self>`.

pub mod challenge;
pub mod lease;
pub mod service_grant;

pub use challenge::{PhoneToSorcChallenge, PhoneToSorcResponse, SorcToPhoneResponse};
pub use lease::{BlobRequest, LtBlobPayload, MtuReceive};
pub use service_grant::{ServiceGrantRequest, ServiceGrantTrigger};

use zerocopy::FromBytes;

use crate::{ProtocolError, Result};

/// Size of one challenge block.
pub const BLOCK_SIZE: usize = 16;

/// Bounds-checked cursor over an untrusted payload.
///
/// Fixed-width fields are read through zerocopy layouts; only the
/// length-prefixed strings and trailing blobs are sliced by hand.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    context: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) const fn new(bytes: &'a [u8], context: &'static str) -> Self {
        Self { bytes, context }
    }

    fn truncated(&self, expected: usize) -> ProtocolError {
        ProtocolError::Truncated { context: self.context, expected, actual: self.bytes.len() }
    }

    /// Next fixed layout.
    pub(crate) fn read<T: FromBytes>(&mut self) -> Result<T> {
        let (value, rest) =
            T::read_from_prefix(self.bytes).map_err(|_| self.truncated(size_of::<T>()))?;
        self.bytes = rest;
        Ok(value)
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let Some((head, tail)) = self.bytes.split_at_checked(len) else {
            return Err(self.truncated(len));
        };
        self.bytes = tail;
        Ok(head)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.read()
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.read()
    }

    /// UTF-8 string of `len` bytes.
    pub(crate) fn string(&mut self, len: usize, field: &'static str) -> Result<String> {
        let raw = self.take(len)?;
        std::str::from_utf8(raw).map(str::to_owned).map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.bytes)
    }
}

/// Length prefix for a string field, checked against the prefix width.
pub(crate) fn checked_len(field: &'static str, value: &str, max: usize) -> Result<usize> {
    if value.len() > max {
        return Err(ProtocolError::FieldTooLong { field, len: value.len(), max });
    }
    Ok(value.len())
}
