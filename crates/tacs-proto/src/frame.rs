//! Data frames: fragmentation and reassembly of messages over a small MTU.
//!
//! A message is cut into `ceil(len / frame_size)` frames (at least one). The
//! kind of each frame depends only on its position in the set:
//!
//! ```text
//! 1 frame:   [Single]
//! n frames:  [Start, Fragment, ..., Fragment, End]
//! ```
//!
//! Wire layout of one frame (integers little-endian):
//!
//! ```text
//! ┌──────┬──────────┬──────────────┬─────────────────┐
//! │ kind │ sequence │ total length │ payload         │
//! │ u8   │ u8       │ u16          │ <= frame_size   │
//! └──────┴──────────┴──────────────┴─────────────────┘
//! ```
//!
//! The codec never reorders. [`FrameAssembler`] buffers frames in arrival
//! order and rejects anything that is not the next expected sequence number.

use bytes::{BufMut, Bytes, BytesMut};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zerocopy::IntoBytes;

use crate::{FrameHeader, ProtocolError, Result};

/// Maximum number of frames in one set (8-bit sequence numbers).
pub const MAX_FRAMES: usize = u8::MAX as usize + 1;

/// Maximum message size (16-bit total length field).
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Position of a frame within its frame set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DataFrameKind {
    /// Sentinel that well-formed fragmentation never produces
    Invalid = 0x00,
    /// First frame of a multi-frame message
    Start = 0x01,
    /// Middle frame of a multi-frame message
    Fragment = 0x02,
    /// Last frame of a multi-frame message
    End = 0x04,
    /// The only frame of a message
    Single = 0x05,
}

impl DataFrameKind {
    /// Kind of the frame at `index` in a set of `count` frames.
    pub const fn for_position(index: usize, count: usize) -> Self {
        if index >= count {
            Self::Invalid
        } else if count == 1 {
            Self::Single
        } else if index == 0 {
            Self::Start
        } else if index + 1 == count {
            Self::End
        } else {
            Self::Fragment
        }
    }

    /// Wire byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse the wire byte. `0x00` decodes to [`DataFrameKind::Invalid`] so
    /// callers can report it as corruption with the frame's sequence number.
    pub const fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::Invalid),
            0x01 => Ok(Self::Start),
            0x02 => Ok(Self::Fragment),
            0x04 => Ok(Self::End),
            0x05 => Ok(Self::Single),
            other => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }

    /// Whether receiving this kind completes a message.
    pub const fn completes_message(self) -> bool {
        matches!(self, Self::End | Self::Single)
    }
}

/// One transport-sized chunk of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Position of this frame in its set
    pub kind: DataFrameKind,
    /// Index of this frame in its set, starting at 0
    pub sequence_number: u8,
    /// Length of the complete message, repeated in every frame
    pub total_message_length: u16,
    /// This frame's slice of the message
    pub payload: Bytes,
}

impl DataFrame {
    /// Size of the fixed frame header.
    pub const HEADER_SIZE: usize = FrameHeader::SIZE;

    /// Create a frame.
    pub fn new(
        kind: DataFrameKind,
        sequence_number: u8,
        total_message_length: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self { kind, sequence_number, total_message_length, payload: payload.into() }
    }

    /// Size of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        let header =
            FrameHeader::new(self.kind, self.sequence_number, self.total_message_length);
        buf.put_slice(header.as_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, payload) = FrameHeader::parse(bytes)?;

        Ok(Self {
            kind: header.kind()?,
            sequence_number: header.sequence(),
            total_message_length: header.total_length(),
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Split `message` into frames carrying at most `frame_size` payload bytes.
///
/// An empty message still yields one `Single` frame. A message whose length
/// is an exact multiple of `frame_size` yields exactly `len / frame_size`
/// frames.
pub fn fragment(message: &[u8], frame_size: usize) -> Result<Vec<DataFrame>> {
    if frame_size == 0 {
        return Err(ProtocolError::ZeroFrameSize);
    }

    let total = u16::try_from(message.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: message.len(),
        max: MAX_MESSAGE_SIZE,
    })?;

    let count = message.len().div_ceil(frame_size).max(1);
    if count > MAX_FRAMES {
        return Err(ProtocolError::TooManyFrames { frames: count, max: MAX_FRAMES });
    }

    let mut frames = Vec::with_capacity(count);
    for (index, chunk) in chunks(message, frame_size).enumerate() {
        frames.push(DataFrame {
            kind: DataFrameKind::for_position(index, count),
            sequence_number: index as u8,
            total_message_length: total,
            payload: Bytes::copy_from_slice(chunk),
        });
    }
    Ok(frames)
}

/// `slice::chunks` yields nothing for an empty slice; an empty message still
/// needs its single empty frame.
fn chunks(message: &[u8], frame_size: usize) -> impl Iterator<Item = &[u8]> {
    let empty: &[u8] = &[];
    let lead = message.is_empty().then_some(empty);
    lead.into_iter().chain(message.chunks(frame_size))
}

/// Concatenate frame payloads in input order.
///
/// The caller decides when a set is complete. The declared total length of
/// the first frame must match the reassembled length; a mismatch discards the
/// message.
pub fn reassemble(frames: &[DataFrame]) -> Result<Bytes> {
    let first = frames.first().ok_or(ProtocolError::EmptyFrameSet)?;
    let declared = usize::from(first.total_message_length);

    let mut message = BytesMut::with_capacity(declared);
    for frame in frames {
        if frame.kind == DataFrameKind::Invalid {
            return Err(ProtocolError::InvalidFrameKind { sequence: frame.sequence_number });
        }
        message.put_slice(&frame.payload);
    }

    if message.len() != declared {
        return Err(ProtocolError::LengthMismatch { declared, actual: message.len() });
    }

    Ok(message.freeze())
}

/// Buffers received frames until a message is complete.
///
/// Frames must arrive in order: sequence numbers contiguous from 0, first
/// frame `Start` or `Single`, later frames `Fragment` or `End`, every frame
/// declaring the same total length. Any violation discards the partial
/// message and returns an error; the assembler is then ready for a new set.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    frames: Vec<DataFrame>,
    buffered: usize,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no partial message is buffered.
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.buffered = 0;
    }

    /// Add the next received frame.
    ///
    /// Returns `Ok(Some(message))` when the frame completes a message,
    /// `Ok(None)` when more frames are needed.
    pub fn push(&mut self, frame: DataFrame) -> Result<Option<Bytes>> {
        let result = self.accept(frame);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn accept(&mut self, frame: DataFrame) -> Result<Option<Bytes>> {
        let position = self.frames.len();
        if position >= MAX_FRAMES {
            return Err(ProtocolError::TooManyFrames { frames: position + 1, max: MAX_FRAMES });
        }

        if frame.kind == DataFrameKind::Invalid {
            return Err(ProtocolError::InvalidFrameKind { sequence: frame.sequence_number });
        }

        let expected = position as u8;
        if frame.sequence_number != expected {
            return Err(ProtocolError::SequenceGap { expected, actual: frame.sequence_number });
        }

        let kind_fits = match frame.kind {
            DataFrameKind::Start | DataFrameKind::Single => position == 0,
            DataFrameKind::Fragment | DataFrameKind::End => position > 0,
            DataFrameKind::Invalid => false,
        };
        if !kind_fits {
            return Err(ProtocolError::UnexpectedFrameKind {
                kind: frame.kind,
                sequence: frame.sequence_number,
            });
        }

        if let Some(first) = self.frames.first() {
            if first.total_message_length != frame.total_message_length {
                return Err(ProtocolError::LengthMismatch {
                    declared: usize::from(first.total_message_length),
                    actual: usize::from(frame.total_message_length),
                });
            }
        }

        self.buffered += frame.payload.len();
        let declared = usize::from(frame.total_message_length);
        if self.buffered > declared {
            return Err(ProtocolError::LengthMismatch { declared, actual: self.buffered });
        }

        let completes = frame.kind.completes_message();
        self.frames.push(frame);

        if !completes {
            return Ok(None);
        }

        let frames = std::mem::take(&mut self.frames);
        self.buffered = 0;
        reassemble(&frames).map(Some)
    }
}
