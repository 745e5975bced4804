//! Wire format for the TACS secure-access link.
//!
//! The link to the in-vehicle access module (SORC) is a byte-oriented BLE
//! characteristic with a small MTU. Every application message is a
//! [`SorcMessage`]: a one-byte id followed by a fixed binary payload record.
//! Messages larger than the MTU are split into [`DataFrame`]s, each carrying
//! a 4-byte header (kind, sequence number, total message length) and a slice
//! of the message.
//!
//! Layering, outermost first:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ DataFrame (kind|seq|len|...) │  frame.rs, one per transport write
//! └──────────────────────────────┘
//!               ↓ reassemble
//! ┌──────────────────────────────┐
//! │ record (plain or AES-CBC)    │  tacs-core
//! └──────────────────────────────┘
//!               ↓ decrypt
//! ┌──────────────────────────────┐
//! │ SorcMessage (id|payload)     │  message.rs + payloads/
//! └──────────────────────────────┘
//! ```
//!
//! # Security
//!
//! Everything in this crate parses untrusted bytes from the radio. Fixed
//! layouts are read through `zerocopy`, and decoders report typed errors;
//! nothing here panics on malformed input.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod ids;
pub mod message;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::{DataFrame, DataFrameKind, FrameAssembler, fragment, reassemble};
pub use header::FrameHeader;
pub use ids::{ServiceGrantId, SorcId};
pub use message::{SorcMessage, SorcMessageId};
