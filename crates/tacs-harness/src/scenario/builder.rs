//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use tacs_core::{
    lease::{LeaseToken, LeaseTokenBlob},
    session::{Session, SessionConfig},
};
use tacs_proto::ServiceGrantId;

use super::{OracleFn, World, default_blob, default_lease_token};
use crate::{SimEnv, SimSorc, SimSorcConfig};

/// Scenario builder.
///
/// Construct a scenario by naming the phone and the SORC and listing the
/// service grants to request once the session is up. Must call `.oracle()`
/// to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    phones: Vec<(String, SessionConfig)>,
    sorcs: Vec<(String, SimSorcConfig)>,
    seed: u64,
    lease_token: LeaseToken,
    blob: LeaseTokenBlob,
    service_grants: Vec<ServiceGrantId>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phones: Vec::new(),
            sorcs: Vec::new(),
            seed: 0,
            lease_token: default_lease_token(),
            blob: default_blob(),
            service_grants: Vec::new(),
        }
    }

    /// Add a phone with default session configuration.
    #[must_use]
    pub fn phone(mut self, name: impl Into<String>) -> Self {
        self.phones.push((name.into(), SessionConfig::default()));
        self
    }

    /// Add a phone with custom session configuration.
    #[must_use]
    pub fn phone_with_config(mut self, name: impl Into<String>, config: SessionConfig) -> Self {
        self.phones.push((name.into(), config));
        self
    }

    /// Add a SORC with default behavior.
    #[must_use]
    pub fn sorc(mut self, name: impl Into<String>) -> Self {
        self.sorcs.push((name.into(), SimSorcConfig::default()));
        self
    }

    /// Add a SORC with custom behavior.
    #[must_use]
    pub fn sorc_with_config(mut self, name: impl Into<String>, config: SimSorcConfig) -> Self {
        self.sorcs.push((name.into(), config));
        self
    }

    /// Seed for the phone's randomness.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Lease token and blob the phone connects with.
    #[must_use]
    pub fn lease(mut self, lease_token: LeaseToken, blob: LeaseTokenBlob) -> Self {
        self.lease_token = lease_token;
        self.blob = blob;
        self
    }

    /// Service grant to request after connecting, in order.
    #[must_use]
    pub fn service_grant(mut self, id: ServiceGrantId) -> Self {
        self.service_grants.push(id);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Phone connects with the lease token; the link runs until quiet
    ///    (MTU, blob, challenge)
    /// 2. Each listed service grant is requested and the link runs until quiet
    /// 3. The oracle verifies the final world
    pub fn run(self) -> Result<(), String> {
        let world = self.execute()?;
        (self.oracle)(&world)
    }

    /// Execute and hand back the world after the oracle passed.
    pub fn run_to_world(self) -> Result<World, String> {
        let world = self.execute()?;
        (self.oracle)(&world)?;
        Ok(world)
    }

    fn execute(&self) -> Result<World, String> {
        let scenario = &self.scenario;
        let ([(phone_name, session_config)], [(sorc_name, sorc_config)]) =
            (scenario.phones.as_slice(), scenario.sorcs.as_slice())
        else {
            return Err(format!(
                "Scenario '{}': exactly one phone and one SORC required (got {} phones, {} SORCs)",
                scenario.name,
                scenario.phones.len(),
                scenario.sorcs.len()
            ));
        };

        let sorc = SimSorc::new(&scenario.lease_token, sorc_config.clone())
            .map_err(|e| format!("Scenario '{}': SORC {sorc_name}: {e}", scenario.name))?;
        let session = Session::new(SimEnv::with_seed(scenario.seed), session_config.clone());
        let mut world = World::new(phone_name.clone(), session, sorc_name.clone(), sorc);

        let actions = world
            .phone_session_mut()
            .connect(&scenario.lease_token, scenario.blob.clone())
            .map_err(|e| format!("Scenario '{}': phone {phone_name} connect: {e}", scenario.name))?;
        world.drive(actions);

        for &id in &scenario.service_grants {
            world.request_service_grant(id).map_err(|e| {
                format!("Scenario '{}': service grant {id:#04x}: {e}", scenario.name)
            })?;
        }

        Ok(world)
    }
}
