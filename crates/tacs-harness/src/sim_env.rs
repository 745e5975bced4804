//! Simulated environment: seeded randomness and a virtual clock.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tacs_core::Environment;

#[derive(Debug)]
struct SimState {
    rng: ChaCha20Rng,
    elapsed: Duration,
}

/// Deterministic [`Environment`].
///
/// Clones share the same RNG and clock, so a phone session and the test
/// driving it observe one timeline. Time only moves through
/// [`SimEnv::advance`].
#[derive(Debug, Clone)]
pub struct SimEnv {
    epoch: Instant,
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { rng: ChaCha20Rng::seed_from_u64(seed), elapsed: Duration::ZERO };
        Self { epoch: Instant::now(), state: Arc::new(Mutex::new(state)) }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        self.state.lock().elapsed += by;
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.epoch + self.state.lock().elapsed
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().rng.fill_bytes(buffer);
    }
}
