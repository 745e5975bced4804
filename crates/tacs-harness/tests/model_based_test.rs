//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! implementation behaves identically to a reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!        Model        ServiceGrantBus   Compare
//!      (reference)    or World (sim)    Results
//! ```

use proptest::prelude::*;
use tacs_core::{
    service_grant::{ServiceGrantBus, ServiceGrantResponse, ServiceGrantStatus},
    session::SessionState,
};
use tacs_harness::scenario::{Scenario, default_blob, default_lease_token, oracle};
use tacs_proto::{ServiceGrantId, SorcId};

/// Operations on the service grant bus.
#[derive(Debug, Clone)]
enum BusOperation {
    Request { id: ServiceGrantId, accepted: bool },
    Respond { id: ServiceGrantId, status: ServiceGrantStatus },
    Reset,
}

/// Reference model: the pending ids as a plain list.
#[derive(Debug, Default)]
struct BusModel {
    pending: Vec<ServiceGrantId>,
}

impl BusModel {
    /// Returns whether a change is published.
    fn apply(&mut self, op: &BusOperation) -> bool {
        match op {
            BusOperation::Request { id, accepted } => {
                if *accepted {
                    self.pending.push(*id);
                }
                true
            },
            BusOperation::Respond { id, status } => {
                let Some(index) = self.pending.iter().position(|p| p == id) else {
                    return false;
                };
                if *status != ServiceGrantStatus::Pending {
                    self.pending.remove(index);
                }
                true
            },
            BusOperation::Reset => {
                self.pending.clear();
                true
            },
        }
    }
}

fn status_strategy() -> impl Strategy<Value = ServiceGrantStatus> {
    prop_oneof![
        3 => Just(ServiceGrantStatus::Success),
        1 => Just(ServiceGrantStatus::Pending),
        1 => Just(ServiceGrantStatus::Failure),
        1 => Just(ServiceGrantStatus::InvalidTimeFrame),
        1 => Just(ServiceGrantStatus::NotAllowed),
    ]
}

fn bus_operation_strategy() -> impl Strategy<Value = BusOperation> {
    let id = 1..=4u16;
    prop_oneof![
        // Weight towards requests and responses
        4 => (id.clone(), any::<bool>()).prop_map(|(id, accepted)| BusOperation::Request { id, accepted }),
        4 => (id, status_strategy()).prop_map(|(id, status)| BusOperation::Respond { id, status }),
        1 => Just(BusOperation::Reset),
    ]
}

/// Operations on a live phone/SORC link.
#[derive(Debug, Clone)]
enum LinkOperation {
    Request(ServiceGrantId),
    Heartbeat,
    DropLink,
    Reconnect,
}

fn link_operation_strategy() -> impl Strategy<Value = LinkOperation> {
    prop_oneof![
        5 => prop::sample::select(vec![0x01u16, 0x02, 0x03, 0x04, 0x05, 0x06, 0x09])
            .prop_map(LinkOperation::Request),
        1 => Just(LinkOperation::Heartbeat),
        1 => Just(LinkOperation::DropLink),
        1 => Just(LinkOperation::Reconnect),
    ]
}

proptest! {
    /// The bus keeps the same ordered multiset as the reference model.
    #[test]
    fn bus_matches_model(ops in prop::collection::vec(bus_operation_strategy(), 0..60)) {
        let mut bus = ServiceGrantBus::new();
        let mut model = BusModel::default();
        let sorc_id = SorcId::from_bytes([1; 16]);

        for (i, op) in ops.iter().enumerate() {
            let expected = model.apply(op);
            let published = match op {
                BusOperation::Request { id, accepted } => Some(bus.request(*id, *accepted)),
                BusOperation::Respond { id, status } => bus.response_received(ServiceGrantResponse {
                    sorc_id,
                    service_grant_id: *id,
                    status: *status,
                    response_data: String::new(),
                }),
                BusOperation::Reset => Some(bus.reset()),
            };

            prop_assert_eq!(
                published.is_some(), expected,
                "Divergence at operation {}: {:?}", i, op
            );
            if let Some(change) = published {
                prop_assert_eq!(&change.state.requesting_service_grant_ids, &model.pending);
            }
            prop_assert_eq!(&bus.state().requesting_service_grant_ids, &model.pending);
        }
    }

    /// Every request made while established reaches the SORC exactly once
    /// and in order, across link drops and reconnects.
    #[test]
    fn link_delivers_requests_in_order(
        seed in any::<u64>(),
        ops in prop::collection::vec(link_operation_strategy(), 0..25),
    ) {
        let mut world = Scenario::new("model")
            .phone("phone")
            .sorc("car")
            .seed(seed)
            .oracle(oracle::all_established())
            .run_to_world()
            .map_err(TestCaseError::fail)?;

        let mut connected = true;
        let mut delivered: Vec<ServiceGrantId> = Vec::new();

        for op in &ops {
            match op {
                LinkOperation::Request(id) => {
                    world.request_service_grant(*id).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    if connected {
                        delivered.push(*id);
                    }
                },
                LinkOperation::Heartbeat => {
                    if connected {
                        let actions = world
                            .phone_session_mut()
                            .heartbeat()
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                        world.drive(actions);
                    }
                },
                LinkOperation::DropLink => {
                    world.drop_link();
                    connected = false;
                },
                LinkOperation::Reconnect => {
                    if !connected {
                        let actions = world
                            .phone_session_mut()
                            .connect(&default_lease_token(), default_blob())
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                        world.drive(actions);
                        connected = true;
                    }
                },
            }

            let expected_state =
                if connected { SessionState::Established } else { SessionState::Disconnected };
            prop_assert_eq!(world.phone_session().state(), expected_state);
            prop_assert_eq!(world.sorc_peer().service_grants(), delivered.as_slice());
            prop_assert!(world.phone_session().initial_change().state.requesting_service_grant_ids.is_empty());
            prop_assert!(world.dropped().is_empty(), "dropped: {:?}", world.dropped());
            prop_assert!(world.failures().is_empty(), "failures: {:?}", world.failures());
        }
    }
}
