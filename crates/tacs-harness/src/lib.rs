//! Deterministic simulation harness for the TACS secure-access link.
//!
//! Seeded implementations of the Environment and Transport traits plus a
//! simulated SORC, for reproducible tests of the phone side.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_sorc;
pub mod sim_transport;

use std::sync::Once;

pub use sim_env::SimEnv;
pub use sim_sorc::{SimSorc, SimSorcConfig};
pub use sim_transport::{SimTransport, SimTransportHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT_TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to debug output for the TACS crates. Safe to
/// call from every test.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,tacs_core=debug,tacs_app=debug"));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .try_init();
    });
}
