//! Environment abstraction.
//!
//! State machines take time and randomness from an [`Environment`] so the
//! same code runs against the OS in production and against a seeded,
//! virtual-clock implementation in simulation.

use std::time::Instant;

use rand::{RngCore, rngs::OsRng};

/// Source of time and randomness.
pub trait Environment: Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Fill `buffer` with random bytes.
    ///
    /// Production implementations must use a cryptographically secure source;
    /// nonces for the handshake are drawn here.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Production environment: wall clock and OS entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}
