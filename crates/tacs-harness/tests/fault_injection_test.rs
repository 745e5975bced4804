//! Fault injection tests for the handshake and the session.
//!
//! The simulated SORC misbehaves in controlled ways: a tampered challenge
//! response, a wrong key, rejected blobs, an unusable MTU, unknown status
//! bytes. The phone must fail closed where the protocol demands it and keep
//! going where it does not.

use std::collections::HashMap;

use tacs_core::{
    ChallengeError, SessionError,
    service_grant::{ServiceGrantAction, ServiceGrantStatus},
    session::{BlobRetryPolicy, SessionConfig, SessionState},
};
use tacs_harness::{
    SimSorcConfig,
    scenario::{Scenario, oracle},
    sim_sorc::ScriptedResponse,
};

#[test]
fn tampered_challenge_response_aborts_without_key() {
    let config = SimSorcConfig { tamper_b2: true, ..Default::default() };
    let world = Scenario::new("tampered b2")
        .phone("phone")
        .sorc_with_config("car", config)
        .service_grant(0x02)
        .oracle(oracle::session_failed())
        .run_to_world()
        .expect("scenario should succeed");

    assert_eq!(
        world.failures(),
        [SessionError::Challenge(ChallengeError::ResponseDoesNotMatch)]
    );
    assert!(world.sorc_peer().phone_rejected(), "phone should report the mismatch");
    assert!(!world.sorc_peer().is_established());
    assert!(!world.states().contains(&SessionState::Established));
    assert!(world.sorc_peer().service_grants().is_empty());
    assert!(!world.is_link_up());
}

#[test]
fn wrong_sorc_key_is_rejected() {
    let config = SimSorcConfig { access_key: Some([0x77; 16]), ..Default::default() };
    let world = Scenario::new("wrong key")
        .phone("phone")
        .sorc_with_config("car", config)
        .oracle(oracle::session_failed())
        .run_to_world()
        .expect("scenario should succeed");

    assert_eq!(
        world.failures(),
        [SessionError::Challenge(ChallengeError::ResponseDoesNotMatch)]
    );
}

#[test]
fn rejected_blob_is_resent() {
    let config = SimSorcConfig { reject_blobs: 2, ..Default::default() };
    let world = Scenario::new("blob rejected twice")
        .phone("phone")
        .sorc_with_config("car", config)
        .oracle(oracle::all_established())
        .run_to_world()
        .expect("scenario should succeed");

    assert_eq!(world.sorc_peer().blobs_received().len(), 3);
    assert_eq!(world.phone_session().blob_attempts(), 3);
}

#[test]
fn blob_retries_are_bounded() {
    let sorc = SimSorcConfig { reject_blobs: 10, ..Default::default() };
    let phone = SessionConfig { blob_retry: BlobRetryPolicy { max_attempts: 3 }, ..Default::default() };
    let world = Scenario::new("blob always rejected")
        .phone_with_config("phone", phone)
        .sorc_with_config("car", sorc)
        .oracle(oracle::session_failed())
        .run_to_world()
        .expect("scenario should succeed");

    assert_eq!(world.failures(), [SessionError::BlobRetriesExhausted { attempts: 3 }]);
    assert_eq!(world.sorc_peer().blobs_received().len(), 3);
}

#[test]
fn unusable_mtu_fails_session() {
    let config = SimSorcConfig { mtu: 4, ..Default::default() };
    let world = Scenario::new("tiny MTU")
        .phone("phone")
        .sorc_with_config("car", config)
        .oracle(oracle::session_failed())
        .run_to_world()
        .expect("scenario should succeed");

    assert_eq!(world.failures(), [SessionError::MtuTooSmall(4)]);
    assert!(world.sorc_peer().blobs_received().is_empty());
}

#[test]
fn unknown_status_byte_keeps_request_pending() {
    let config = SimSorcConfig {
        responses: HashMap::from([(0x02, vec![ScriptedResponse::with_status(0x09, "")])]),
        ..Default::default()
    };
    let world = Scenario::new("unknown status")
        .phone("phone")
        .sorc_with_config("car", config)
        .service_grant(0x02)
        .oracle(oracle::all_established())
        .run_to_world()
        .expect("scenario should succeed");

    let pending = world.phone_session().initial_change().state.requesting_service_grant_ids;
    assert_eq!(pending, [0x02]);
    assert!(
        !world
            .changes()
            .iter()
            .any(|change| matches!(change.action, ServiceGrantAction::ResponseReceived(_)))
    );
}

#[test]
fn pending_status_is_followed_by_final_response() {
    let config = SimSorcConfig {
        responses: HashMap::from([(
            0x01,
            vec![ScriptedResponse::with_status(0x01, ""), ScriptedResponse::success("")],
        )]),
        ..Default::default()
    };
    let world = Scenario::new("pending then success")
        .phone("phone")
        .sorc_with_config("car", config)
        .service_grant(0x01)
        .oracle(oracle::all_of(vec![oracle::all_established(), oracle::service_grants_answered()]))
        .run_to_world()
        .expect("scenario should succeed");

    let statuses: Vec<_> = world
        .changes()
        .iter()
        .filter_map(|change| match &change.action {
            ServiceGrantAction::ResponseReceived(response) => {
                Some((response.status, change.state.requesting_service_grant_ids.clone()))
            },
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        [(ServiceGrantStatus::Pending, vec![0x01_u16]), (ServiceGrantStatus::Success, Vec::new())]
    );
}
