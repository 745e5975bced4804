//! Error types for the core state machines.

use tacs_proto::ProtocolError;
use thiserror::Error;

use crate::{challenger::ChallengerState, session::SessionState};

/// Block cipher failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key is not 16 bytes
    #[error("invalid key length: {0} bytes (expected 16)")]
    InvalidKeyLength(usize),

    /// Input length is not a multiple of the block size
    #[error("encryption failed: {len} bytes is not a multiple of the block size")]
    EncryptionFailed {
        /// Input length
        len: usize,
    },

    /// Input length is not a multiple of the block size
    #[error("decryption failed: {len} bytes is not a multiple of the block size")]
    DecryptionFailed {
        /// Input length
        len: usize,
    },

    /// Decrypted record is malformed
    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),
}

/// Lease token failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// Access key is not valid hex
    #[error("access key is not valid hex")]
    InvalidHex,

    /// Access key does not decode to a 16-byte AES key
    #[error("access key is {0} bytes (expected 16)")]
    InvalidKeyLength(usize),

    /// An id does not fit its one-byte length prefix
    #[error("{field} is {len} bytes (max 255)")]
    IdTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
    },
}

/// Handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    /// SORC proof of the phone nonce did not match
    #[error("challenge response does not match")]
    ResponseDoesNotMatch,

    /// SORC response was missing b1 or b2
    #[error("challenge response is corrupt")]
    ResponseIsCorrupt,

    /// Non-handshake message arrived while the handshake was running
    #[error("not a challenge message")]
    NoChallengeMessage,

    /// Block encryption failed
    #[error("AES encryption failed")]
    EncryptionFailed,

    /// Block decryption failed
    #[error("AES decryption failed")]
    DecryptionFailed,

    /// Lease token key could not be used
    #[error("invalid lease token: {0}")]
    InvalidLeaseToken(#[from] LeaseError),

    /// Operation not allowed in the current state
    #[error("invalid state {state:?} for {operation}")]
    InvalidState {
        /// State when the operation was attempted
        state: ChallengerState,
        /// Operation attempted
        operation: &'static str,
    },

    /// Handshake was cancelled
    #[error("handshake cancelled")]
    Cancelled,
}

/// Session failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Handshake failed
    #[error("handshake failed: {0}")]
    Challenge(#[from] ChallengeError),

    /// Wire data could not be decoded or encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Record could not be encrypted or decrypted
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// SORC kept rejecting the lease token blob
    #[error("lease token blob rejected {attempts} times")]
    BlobRetriesExhausted {
        /// Blob transmissions made
        attempts: u32,
    },

    /// SORC reported an MTU too small to carry a frame
    #[error("MTU {0} is too small")]
    MtuTooSmall(u16),

    /// Operation not allowed in the current state
    #[error("invalid state {state:?} for {operation}")]
    InvalidState {
        /// State when the operation was attempted
        state: SessionState,
        /// Operation attempted
        operation: &'static str,
    },
}
