//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Input ended before a fixed-width field could be read
    #[error("truncated {context}: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// What was being decoded
        context: &'static str,
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Frame kind byte does not name a known kind
    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownFrameKind(u8),

    /// Frame carried the `Invalid` sentinel kind
    #[error("invalid frame kind in frame {sequence}")]
    InvalidFrameKind {
        /// Sequence number of the offending frame
        sequence: u8,
    },

    /// Message id byte does not name a known message
    #[error("unknown message id: 0x{0:02x}")]
    UnknownMessageId(u8),

    /// Frame size of zero cannot carry any payload
    #[error("frame size must be at least 1 byte")]
    ZeroFrameSize,

    /// Message does not fit the 16-bit total length field
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Actual message size
        size: usize,
        /// Maximum encodable size
        max: usize,
    },

    /// Message would need more frames than the 8-bit sequence number allows
    #[error("message needs {frames} frames (max {max})")]
    TooManyFrames {
        /// Frames required
        frames: usize,
        /// Maximum frame count
        max: usize,
    },

    /// Reassembly got no frames at all
    #[error("no frames to reassemble")]
    EmptyFrameSet,

    /// Declared total length disagrees with the reassembled length
    #[error("length mismatch: declared {declared} bytes, reassembled {actual}")]
    LengthMismatch {
        /// Length declared in the frame headers
        declared: usize,
        /// Length actually received
        actual: usize,
    },

    /// Frame arrived out of sequence
    #[error("unexpected sequence number: expected {expected}, got {actual}")]
    SequenceGap {
        /// Next sequence number the assembler was waiting for
        expected: u8,
        /// Sequence number received
        actual: u8,
    },

    /// Frame kind is not allowed at this position of a frame set
    #[error("unexpected {kind:?} frame at sequence {sequence}")]
    UnexpectedFrameKind {
        /// Kind received
        kind: crate::frame::DataFrameKind,
        /// Sequence number received
        sequence: u8,
    },

    /// A string field was not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A string field is longer than its length prefix allows
    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },
}
