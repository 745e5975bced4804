//! Scenario tests with a mandatory oracle.
//!
//! A scenario wires one phone session to one simulated SORC, drives the link
//! to quiescence and hands the final [`World`] to an oracle. A scenario
//! without an oracle cannot be run.
//!
//! ```ignore
//! Scenario::new("lock")
//!     .phone("phone")
//!     .sorc("car")
//!     .service_grant(0x02)
//!     .oracle(oracle::all_of(vec![oracle::all_established(), oracle::service_grants_answered()]))
//!     .run()?;
//! ```

mod builder;
mod world;

use bytes::Bytes;
pub use builder::{RunnableScenario, Scenario};
use tacs_core::lease::{LeaseToken, LeaseTokenBlob};
use tacs_proto::SorcId;
pub use world::World;

/// Verifies the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;

/// Lease token used when a scenario does not set one.
pub fn default_lease_token() -> LeaseToken {
    LeaseToken {
        id: "lease-token-1".into(),
        lease_id: "lease-1".into(),
        sorc_id: SorcId::from_bytes(*b"simulated-sorc-1"),
        sorc_access_key: "1a45467ba4a5f1d2e4e5c4f8b8a3c2d1".into(),
    }
}

/// Blob used when a scenario does not set one.
pub fn default_blob() -> LeaseTokenBlob {
    LeaseTokenBlob { message_counter: 1, data: Bytes::from_static(b"platform-signed-lease-blob") }
}

/// Reusable oracles.
pub mod oracle {
    use tacs_core::session::SessionState;

    use super::{OracleFn, World};

    /// Both ends finished the handshake.
    pub fn all_established() -> OracleFn {
        Box::new(|world| {
            if world.phone_session().state() != SessionState::Established {
                return Err(format!("phone is {:?}", world.phone_session().state()));
            }
            if !world.sorc_peer().is_established() {
                return Err("SORC did not establish".into());
            }
            Ok(())
        })
    }

    /// Every requested service grant reached the SORC and was resolved.
    pub fn service_grants_answered() -> OracleFn {
        Box::new(|world| {
            let pending = &world.phone_session().initial_change().state.requesting_service_grant_ids;
            if !pending.is_empty() {
                return Err(format!("service grants still pending: {pending:?}"));
            }
            if world.sorc_peer().service_grants() != world.requested_service_grants() {
                return Err(format!(
                    "SORC saw {:?}, phone requested {:?}",
                    world.sorc_peer().service_grants(),
                    world.requested_service_grants()
                ));
            }
            Ok(())
        })
    }

    /// The session failed at least once and ended disconnected.
    pub fn session_failed() -> OracleFn {
        Box::new(|world| {
            if world.failures().is_empty() {
                return Err("expected a session failure".into());
            }
            if world.phone_session().state() != SessionState::Disconnected {
                return Err(format!("phone is {:?}", world.phone_session().state()));
            }
            Ok(())
        })
    }

    /// Run every oracle; the first error wins.
    pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
        Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
    }
}
