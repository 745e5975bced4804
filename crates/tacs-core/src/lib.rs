//! TACS secure-access core logic
//!
//! Pure state machine logic for the phone side of the SORC link, completely
//! decoupled from I/O. Nothing in this crate touches a radio, a clock or an
//! entropy source directly.
//!
//! # Architecture
//!
//! Protocol logic in this crate is implemented as deterministic state
//! machines. Time and randomness come from an [`Environment`]; transport
//! effects are returned as declarative actions that a runtime or test harness
//! executes.
//!
//! # Components
//!
//! - [`challenger`]: Mutual challenge-response handshake producing a session key
//! - [`session`]: Link session (MTU, blob transfer, framing, encryption)
//! - [`service_grant`]: Service grant change bus
//! - [`record`]: Plain and encrypted message records
//! - [`crypto`]: AES-128-CBC block primitive
//! - [`lease`]: Lease token and key material
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport abstraction (link to the SORC)
//! - [`error`]: Error types

pub mod challenger;
pub mod crypto;
pub mod env;
pub mod error;
pub mod lease;
pub mod record;
pub mod service_grant;
pub mod session;
pub mod transport;

pub use env::{Environment, SystemEnv};
pub use error::{ChallengeError, CryptoError, LeaseError, SessionError};
