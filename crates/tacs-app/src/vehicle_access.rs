//! Vehicle access features: lock, unlock, ignition.
//!
//! Each feature maps to one service grant id through a fixed table. The
//! manager keeps its own queue of requested features, oldest first, and
//! claims only bus changes for features it is waiting on.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tacs_core::service_grant::{
    ServiceGrantAction, ServiceGrantChange, ServiceGrantResponse, ServiceGrantStatus,
};
use tacs_proto::ServiceGrantId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{ChangeSubject, Consumption, ServiceGrantConsumer, ServiceGrantRequester, SubjectConfig};

/// Response data meaning the SORC destroyed its key for this lease.
pub const KEY_DESTROYED: &str = "KEY_DESTROYED";

/// Vehicle access feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleAccessFeature {
    /// Unlock the doors
    Unlock,
    /// Lock the doors
    Lock,
    /// Query the lock state
    LockStatus,
    /// Enable the ignition
    EnableIgnition,
    /// Disable the ignition
    DisableIgnition,
    /// Query the ignition state
    IgnitionStatus,
}

impl VehicleAccessFeature {
    /// Every feature.
    pub const ALL: [Self; 6] = [
        Self::Unlock,
        Self::Lock,
        Self::LockStatus,
        Self::EnableIgnition,
        Self::DisableIgnition,
        Self::IgnitionStatus,
    ];

    /// Service grant id of this feature.
    pub const fn service_grant_id(self) -> ServiceGrantId {
        match self {
            Self::Unlock => 0x01,
            Self::Lock => 0x02,
            Self::LockStatus => 0x03,
            Self::EnableIgnition => 0x04,
            Self::DisableIgnition => 0x05,
            Self::IgnitionStatus => 0x06,
        }
    }

    /// Feature for a service grant id. Ids owned by other managers yield `None`.
    pub fn from_service_grant_id(id: ServiceGrantId) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.service_grant_id() == id)
    }
}

/// Result of a successful feature request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAccessFeatureStatus {
    /// Doors unlocked
    Unlock,
    /// Doors locked
    Lock,
    /// Current lock state
    LockStatus {
        /// Whether the doors are locked
        locked: bool,
    },
    /// Ignition enabled
    EnableIgnition,
    /// Ignition disabled
    DisableIgnition,
    /// Current ignition state
    IgnitionStatus {
        /// Whether the ignition is enabled
        enabled: bool,
    },
}

impl VehicleAccessFeatureStatus {
    /// Parse a successful response. Status queries need a known state word.
    fn parse(feature: VehicleAccessFeature, response_data: &str) -> Option<Self> {
        Some(match feature {
            VehicleAccessFeature::Unlock => Self::Unlock,
            VehicleAccessFeature::Lock => Self::Lock,
            VehicleAccessFeature::EnableIgnition => Self::EnableIgnition,
            VehicleAccessFeature::DisableIgnition => Self::DisableIgnition,
            VehicleAccessFeature::LockStatus => match response_data {
                "LOCKED" => Self::LockStatus { locked: true },
                "UNLOCKED" => Self::LockStatus { locked: false },
                _ => return None,
            },
            VehicleAccessFeature::IgnitionStatus => match response_data {
                "ENABLED" => Self::IgnitionStatus { enabled: true },
                "DISABLED" => Self::IgnitionStatus { enabled: false },
                _ => return None,
            },
        })
    }
}

/// Why a feature request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAccessFeatureError {
    /// Lease does not allow the feature right now
    Denied,
    /// SORC destroyed its key for this lease
    KeyDestroyed,
    /// SORC could not execute the feature
    RemoteFailed,
}

/// Final outcome of a feature request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAccessFeatureResponse {
    /// Feature executed
    Success(VehicleAccessFeatureStatus),
    /// Feature failed
    Failure {
        /// Requested feature
        feature: VehicleAccessFeature,
        /// Reason
        error: VehicleAccessFeatureError,
    },
}

impl VehicleAccessFeatureResponse {
    /// Map a final service grant response.
    fn from_response(feature: VehicleAccessFeature, response: &ServiceGrantResponse) -> Self {
        let failure = |error| Self::Failure { feature, error };
        if response.response_data == KEY_DESTROYED {
            return failure(VehicleAccessFeatureError::KeyDestroyed);
        }
        match response.status {
            ServiceGrantStatus::Success => {
                VehicleAccessFeatureStatus::parse(feature, &response.response_data)
                    .map_or(failure(VehicleAccessFeatureError::RemoteFailed), Self::Success)
            },
            ServiceGrantStatus::InvalidTimeFrame | ServiceGrantStatus::NotAllowed => {
                failure(VehicleAccessFeatureError::Denied)
            },
            ServiceGrantStatus::Failure | ServiceGrantStatus::Pending => {
                failure(VehicleAccessFeatureError::RemoteFailed)
            },
        }
    }
}

/// What happened to a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAccessFeatureAction {
    /// Snapshot for new subscribers
    Initial,
    /// Request went out (`accepted`) or was refused
    RequestFeature {
        /// Requested feature
        feature: VehicleAccessFeature,
        /// Whether the request went out
        accepted: bool,
    },
    /// Final response arrived
    ResponseReceived(VehicleAccessFeatureResponse),
    /// Session ended; all requests dropped
    Reset,
}

/// Published by the vehicle access manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleAccessFeatureChange {
    /// Features awaiting a final response, oldest first
    pub state: Vec<VehicleAccessFeature>,
    /// What happened
    pub action: VehicleAccessFeatureAction,
}

#[derive(Debug)]
struct Inner {
    requested: Vec<VehicleAccessFeature>,
    subject: ChangeSubject<VehicleAccessFeatureChange>,
}

impl Inner {
    fn publish(&mut self, action: VehicleAccessFeatureAction) {
        let change = VehicleAccessFeatureChange { state: self.requested.clone(), action };
        self.subject.publish(change);
    }

    fn remove_oldest(&mut self, feature: VehicleAccessFeature) -> bool {
        match self.requested.iter().position(|f| *f == feature) {
            Some(index) => {
                self.requested.remove(index);
                true
            },
            None => false,
        }
    }
}

/// Owner of the vehicle access service grants.
///
/// Cloning yields another handle to the same manager; one handle goes into
/// the runtime's [`Dispatcher`](crate::Dispatcher), others stay with callers.
#[derive(Debug, Clone)]
pub struct VehicleAccessManager {
    inner: Arc<Mutex<Inner>>,
    requester: ServiceGrantRequester,
}

impl VehicleAccessManager {
    /// Create a manager that sends its requests through `requester`.
    pub fn new(requester: ServiceGrantRequester, config: SubjectConfig) -> Self {
        let initial = VehicleAccessFeatureChange {
            state: Vec::new(),
            action: VehicleAccessFeatureAction::Initial,
        };
        let inner = Inner { requested: Vec::new(), subject: ChangeSubject::new(initial, config) };
        Self { inner: Arc::new(Mutex::new(inner)), requester }
    }

    /// Request a feature.
    ///
    /// The request is queued locally and handed to the runtime; the outcome
    /// arrives later on the change stream. Nothing is published from here,
    /// and a request the runtime can no longer take is only logged.
    pub fn request_feature(&self, feature: VehicleAccessFeature) -> ServiceGrantId {
        let id = feature.service_grant_id();
        let mut inner = self.inner.lock();
        inner.requested.push(feature);
        if !self.requester.request(id) {
            warn!(?feature, "runtime gone, feature request dropped");
            inner.remove_oldest(feature);
        }
        id
    }

    /// Features awaiting a final response, oldest first.
    pub fn requested_features(&self) -> Vec<VehicleAccessFeature> {
        self.inner.lock().requested.clone()
    }

    /// Last change and a receiver for later ones.
    pub fn subscribe(
        &self,
    ) -> (VehicleAccessFeatureChange, broadcast::Receiver<VehicleAccessFeatureChange>) {
        self.inner.lock().subject.subscribe()
    }

    /// Last published change.
    pub fn last_change(&self) -> VehicleAccessFeatureChange {
        self.inner.lock().subject.last().clone()
    }
}

impl ServiceGrantConsumer for VehicleAccessManager {
    fn try_consume(&mut self, change: ServiceGrantChange) -> Consumption {
        let mut inner = self.inner.lock();
        match &change.action {
            ServiceGrantAction::Initial => Consumption::PassThrough(change),
            ServiceGrantAction::Reset => {
                inner.requested.clear();
                inner.publish(VehicleAccessFeatureAction::Reset);
                Consumption::PassThrough(change)
            },
            ServiceGrantAction::RequestServiceGrant { id, accepted } => {
                let Some(feature) = VehicleAccessFeature::from_service_grant_id(*id) else {
                    return Consumption::PassThrough(change);
                };
                if !inner.requested.contains(&feature) {
                    return Consumption::PassThrough(change);
                }
                if !accepted {
                    inner.remove_oldest(feature);
                }
                debug!(?feature, accepted, "feature request acknowledged");
                inner.publish(VehicleAccessFeatureAction::RequestFeature {
                    feature,
                    accepted: *accepted,
                });
                Consumption::Consumed
            },
            ServiceGrantAction::ResponseReceived(response) => {
                let Some(feature) =
                    VehicleAccessFeature::from_service_grant_id(response.service_grant_id)
                else {
                    return Consumption::PassThrough(change);
                };
                if !inner.requested.contains(&feature) {
                    return Consumption::PassThrough(change);
                }
                if !response.status.is_final() {
                    debug!(?feature, "feature still pending");
                    return Consumption::Consumed;
                }
                inner.remove_oldest(feature);
                let result = VehicleAccessFeatureResponse::from_response(feature, response);
                debug!(?feature, ?result, "feature response");
                inner.publish(VehicleAccessFeatureAction::ResponseReceived(result));
                Consumption::Consumed
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use tacs_core::service_grant::ServiceGrantState;
    use tacs_proto::SorcId;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::RuntimeCommand;

    fn manager() -> (VehicleAccessManager, UnboundedReceiver<RuntimeCommand>) {
        let (requester, rx) = ServiceGrantRequester::channel();
        (VehicleAccessManager::new(requester, SubjectConfig::default()), rx)
    }

    fn accepted(feature: VehicleAccessFeature) -> ServiceGrantChange {
        ServiceGrantChange {
            state: ServiceGrantState::default(),
            action: ServiceGrantAction::RequestServiceGrant {
                id: feature.service_grant_id(),
                accepted: true,
            },
        }
    }

    fn response(id: ServiceGrantId, status: ServiceGrantStatus, data: &str) -> ServiceGrantChange {
        ServiceGrantChange {
            state: ServiceGrantState::default(),
            action: ServiceGrantAction::ResponseReceived(ServiceGrantResponse {
                sorc_id: SorcId::from_bytes([0xbe; 16]),
                service_grant_id: id,
                status,
                response_data: data.into(),
            }),
        }
    }

    #[test]
    fn feature_table_is_complete_and_unique() {
        let ids: HashSet<_> =
            VehicleAccessFeature::ALL.iter().map(|f| f.service_grant_id()).collect();
        assert_eq!(ids.len(), VehicleAccessFeature::ALL.len());
        for feature in VehicleAccessFeature::ALL {
            assert_eq!(
                VehicleAccessFeature::from_service_grant_id(feature.service_grant_id()),
                Some(feature)
            );
        }
        assert_eq!(VehicleAccessFeature::from_service_grant_id(0x09), None);
        assert_eq!(VehicleAccessFeature::from_service_grant_id(0x00), None);
    }

    #[test]
    fn initial_is_passed_through() {
        let (mut sut, _rx) = manager();
        let change = ServiceGrantChange::initial_with_state(ServiceGrantState::default());
        assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
    }

    #[test]
    fn ack_for_unrequested_feature_passes_through() {
        let (mut sut, _rx) = manager();
        let change = accepted(VehicleAccessFeature::Lock);
        assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
    }

    #[test]
    fn ack_for_requested_feature_is_consumed() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Lock);

        assert_eq!(sut.try_consume(accepted(VehicleAccessFeature::Lock)), Consumption::Consumed);
        assert_eq!(
            sut.last_change(),
            VehicleAccessFeatureChange {
                state: vec![VehicleAccessFeature::Lock],
                action: VehicleAccessFeatureAction::RequestFeature {
                    feature: VehicleAccessFeature::Lock,
                    accepted: true,
                },
            }
        );
    }

    #[test]
    fn rejected_request_is_dropped() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Unlock);
        let mut change = accepted(VehicleAccessFeature::Unlock);
        change.action = ServiceGrantAction::RequestServiceGrant { id: 0x01, accepted: false };

        assert_eq!(sut.try_consume(change), Consumption::Consumed);
        assert!(sut.requested_features().is_empty());
    }

    #[test]
    fn response_resolves_request() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Lock);
        sut.try_consume(accepted(VehicleAccessFeature::Lock));

        let change = response(0x02, ServiceGrantStatus::Success, "");
        assert_eq!(sut.try_consume(change), Consumption::Consumed);
        assert_eq!(
            sut.last_change(),
            VehicleAccessFeatureChange {
                state: vec![],
                action: VehicleAccessFeatureAction::ResponseReceived(
                    VehicleAccessFeatureResponse::Success(VehicleAccessFeatureStatus::Lock)
                ),
            }
        );
    }

    #[test]
    fn second_request_stays_pending() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Lock);
        sut.request_feature(VehicleAccessFeature::Lock);
        sut.try_consume(accepted(VehicleAccessFeature::Lock));
        sut.try_consume(accepted(VehicleAccessFeature::Lock));

        sut.try_consume(response(0x02, ServiceGrantStatus::Success, ""));
        assert_eq!(sut.last_change().state, vec![VehicleAccessFeature::Lock]);

        let second = response(0x02, ServiceGrantStatus::Success, "");
        assert_eq!(sut.try_consume(second), Consumption::Consumed);
        assert!(sut.requested_features().is_empty());
        assert!(sut.last_change().state.is_empty());
    }

    #[test]
    fn response_for_other_manager_passes_through() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Lock);
        let change = response(0x09, ServiceGrantStatus::Success, "");
        assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
        assert_eq!(sut.requested_features(), vec![VehicleAccessFeature::Lock]);
    }

    #[test]
    fn response_for_unrequested_feature_passes_through() {
        let (mut sut, _rx) = manager();
        let change = response(0x02, ServiceGrantStatus::Success, "");
        assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
    }

    #[test]
    fn key_destroyed_is_a_failure() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::LockStatus);
        sut.try_consume(accepted(VehicleAccessFeature::LockStatus));

        sut.try_consume(response(0x03, ServiceGrantStatus::Success, KEY_DESTROYED));
        assert_eq!(
            sut.last_change(),
            VehicleAccessFeatureChange {
                state: vec![],
                action: VehicleAccessFeatureAction::ResponseReceived(
                    VehicleAccessFeatureResponse::Failure {
                        feature: VehicleAccessFeature::LockStatus,
                        error: VehicleAccessFeatureError::KeyDestroyed,
                    }
                ),
            }
        );
    }

    #[test]
    fn status_features_parse_response_data() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::LockStatus);
        sut.request_feature(VehicleAccessFeature::IgnitionStatus);

        sut.try_consume(response(0x03, ServiceGrantStatus::Success, "UNLOCKED"));
        assert_eq!(
            sut.last_change().action,
            VehicleAccessFeatureAction::ResponseReceived(VehicleAccessFeatureResponse::Success(
                VehicleAccessFeatureStatus::LockStatus { locked: false }
            ))
        );

        sut.try_consume(response(0x06, ServiceGrantStatus::Success, "garbage"));
        assert_eq!(
            sut.last_change().action,
            VehicleAccessFeatureAction::ResponseReceived(VehicleAccessFeatureResponse::Failure {
                feature: VehicleAccessFeature::IgnitionStatus,
                error: VehicleAccessFeatureError::RemoteFailed,
            })
        );
    }

    #[test]
    fn pending_status_keeps_request_without_change() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Unlock);
        let before = sut.last_change();

        assert_eq!(
            sut.try_consume(response(0x01, ServiceGrantStatus::Pending, "")),
            Consumption::Consumed
        );
        assert_eq!(sut.requested_features(), vec![VehicleAccessFeature::Unlock]);
        assert_eq!(sut.last_change(), before);
    }

    #[test]
    fn not_allowed_is_denied() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::EnableIgnition);
        sut.try_consume(response(0x04, ServiceGrantStatus::NotAllowed, ""));
        assert_eq!(
            sut.last_change().action,
            VehicleAccessFeatureAction::ResponseReceived(VehicleAccessFeatureResponse::Failure {
                feature: VehicleAccessFeature::EnableIgnition,
                error: VehicleAccessFeatureError::Denied,
            })
        );
    }

    #[test]
    fn reset_clears_requests_and_passes_through() {
        let (mut sut, _rx) = manager();
        sut.request_feature(VehicleAccessFeature::Lock);
        let change = ServiceGrantChange {
            state: ServiceGrantState::default(),
            action: ServiceGrantAction::Reset,
        };
        assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
        assert!(sut.requested_features().is_empty());
        assert_eq!(sut.last_change().action, VehicleAccessFeatureAction::Reset);
    }

    #[test]
    fn request_without_runtime_publishes_nothing() {
        let (requester, rx) = ServiceGrantRequester::channel();
        drop(rx);
        let sut = VehicleAccessManager::new(requester, SubjectConfig::default());
        let (_, mut changes) = sut.subscribe();
        sut.request_feature(VehicleAccessFeature::Lock);
        assert!(sut.requested_features().is_empty());
        assert_eq!(sut.last_change().action, VehicleAccessFeatureAction::Initial);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn request_is_forwarded_to_runtime() {
        let (requester, mut rx) = ServiceGrantRequester::channel();
        let sut = VehicleAccessManager::new(requester, SubjectConfig::default());
        assert_eq!(sut.request_feature(VehicleAccessFeature::DisableIgnition), 0x05);
        assert!(matches!(rx.try_recv(), Ok(RuntimeCommand::RequestServiceGrant(0x05))));
    }

    proptest! {
        #[test]
        fn foreign_ids_never_touch_requests(id in 7u16.., status in 0u8..=4) {
            let (mut sut, _rx) = manager();
            sut.request_feature(VehicleAccessFeature::Lock);
            let Some(status) = ServiceGrantStatus::from_u8(status) else {
                return Ok(());
            };
            let change = response(id, status, "");
            prop_assert_eq!(sut.try_consume(change.clone()), Consumption::PassThrough(change));
            prop_assert_eq!(sut.requested_features(), vec![VehicleAccessFeature::Lock]);
        }
    }
}
