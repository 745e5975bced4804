//! Fixed data frame header.
//!
//! The header is a `#[repr(C)]` zerocopy layout so it is parsed in place
//! from the front of the transport write, never byte by byte.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, little_endian::U16};

use crate::{ProtocolError, Result, frame::DataFrameKind};

/// Header in front of every data frame payload.
///
/// ```text
/// ┌──────┬──────────┬──────────────┐
/// │ kind │ sequence │ total length │
/// │ u8   │ u8       │ u16 LE       │
/// └──────┴──────────┴──────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct FrameHeader {
    kind: u8,
    sequence: u8,
    total_length: U16,
}

const _: () = assert!(FrameHeader::SIZE == 4);

impl FrameHeader {
    /// Encoded size.
    pub const SIZE: usize = size_of::<Self>();

    /// Header for a frame at `sequence` of a message `total_length` long.
    pub fn new(kind: DataFrameKind, sequence: u8, total_length: u16) -> Self {
        Self { kind: kind.to_u8(), sequence, total_length: U16::new(total_length) }
    }

    /// Split `bytes` into the header and the payload behind it.
    pub fn parse(bytes: &[u8]) -> Result<(&Self, &[u8])> {
        Self::ref_from_prefix(bytes).map_err(|_| ProtocolError::Truncated {
            context: "data frame header",
            expected: Self::SIZE,
            actual: bytes.len(),
        })
    }

    /// Frame kind; unknown bytes are an error.
    pub fn kind(&self) -> Result<DataFrameKind> {
        DataFrameKind::from_u8(self.kind)
    }

    /// Raw kind byte.
    pub fn kind_byte(&self) -> u8 {
        self.kind
    }

    /// Sequence number.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Declared length of the whole message.
    pub fn total_length(&self) -> u16 {
        self.total_length.get()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let header = FrameHeader::new(DataFrameKind::Start, 2, 0x0102);
        assert_eq!(header.as_bytes(), hex!("01 02 02 01"));
    }

    #[test]
    fn parse_splits_payload() {
        let bytes = hex!("05 00 03 00 41 42 43");
        let (header, payload) = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.kind().unwrap(), DataFrameKind::Single);
        assert_eq!(header.sequence(), 0);
        assert_eq!(header.total_length(), 3);
        assert_eq!(payload, b"ABC");
    }

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(
            FrameHeader::parse(&[0x05, 0x00, 0x01]),
            Err(ProtocolError::Truncated {
                context: "data frame header",
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let (header, _) = FrameHeader::parse(&hex!("03 00 00 00")).unwrap();
        assert_eq!(header.kind_byte(), 0x03);
        assert_eq!(header.kind(), Err(ProtocolError::UnknownFrameKind(0x03)));
    }
}
