//! Service grant change bus.
//!
//! Every service grant lifecycle transition on the link (request sent or
//! refused, response received, session reset) is published as a
//! [`ServiceGrantChange`]. The change carries a snapshot of all pending
//! service grant ids so late subscribers can rebuild their view.
//!
//! The pending ids form an ordered multiset: the same grant can be requested
//! several times before the first response arrives, and responses resolve
//! requests oldest first.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use tacs_proto::{ServiceGrantId, SorcId, payloads::ServiceGrantTrigger};
use tracing::{debug, trace};

/// Status of a service grant reported by the SORC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ServiceGrantStatus {
    /// Finished with success
    Success = 0x00,
    /// Still running; a final response follows
    Pending = 0x01,
    /// Finished with failure
    Failure = 0x02,
    /// Lease is outside its valid time frame
    InvalidTimeFrame = 0x03,
    /// Grant is not allowed for this lease
    NotAllowed = 0x04,
}

impl ServiceGrantStatus {
    /// Parse the wire byte.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Success,
            0x01 => Self::Pending,
            0x02 => Self::Failure,
            0x03 => Self::InvalidTimeFrame,
            0x04 => Self::NotAllowed,
            _ => return None,
        })
    }

    /// Whether this status ends the request.
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Response to a service grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGrantResponse {
    /// SORC that executed the grant
    pub sorc_id: SorcId,
    /// Grant that was requested
    pub service_grant_id: ServiceGrantId,
    /// Outcome
    pub status: ServiceGrantStatus,
    /// Free-form result text (e.g. `LOCKED`, `KEY_DESTROYED`, JSON)
    pub response_data: String,
}

impl ServiceGrantResponse {
    /// Build from a decoded trigger. Unknown status bytes yield `None`.
    pub fn from_trigger(sorc_id: SorcId, trigger: ServiceGrantTrigger) -> Option<Self> {
        let status = ServiceGrantStatus::from_u8(trigger.status)?;
        Some(Self {
            sorc_id,
            service_grant_id: trigger.service_grant_id,
            status,
            response_data: trigger.response_data,
        })
    }
}

/// Pending service grant ids, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGrantState {
    /// Ids awaiting a final response; duplicates allowed
    pub requesting_service_grant_ids: Vec<ServiceGrantId>,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceGrantAction {
    /// Snapshot for new subscribers
    Initial,
    /// A request was sent (`accepted`) or refused because no session exists
    RequestServiceGrant {
        /// Requested grant
        id: ServiceGrantId,
        /// Whether the request went out
        accepted: bool,
    },
    /// The SORC answered
    ResponseReceived(ServiceGrantResponse),
    /// Session ended; all pending requests were dropped
    Reset,
}

/// One published transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGrantChange {
    /// Pending ids after the transition
    pub state: ServiceGrantState,
    /// The transition
    pub action: ServiceGrantAction,
}

impl ServiceGrantChange {
    /// Initial change for a given state.
    pub fn initial_with_state(state: ServiceGrantState) -> Self {
        Self { state, action: ServiceGrantAction::Initial }
    }

    /// Service grant id the change is about, if any.
    pub fn service_grant_id(&self) -> Option<ServiceGrantId> {
        match &self.action {
            ServiceGrantAction::RequestServiceGrant { id, .. } => Some(*id),
            ServiceGrantAction::ResponseReceived(response) => Some(response.service_grant_id),
            ServiceGrantAction::Initial | ServiceGrantAction::Reset => None,
        }
    }
}

/// Owner of the global pending multiset.
#[derive(Debug, Clone, Default)]
pub struct ServiceGrantBus {
    state: ServiceGrantState,
}

impl ServiceGrantBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pending ids.
    pub fn state(&self) -> &ServiceGrantState {
        &self.state
    }

    /// Change describing the current state, for late subscribers.
    pub fn initial(&self) -> ServiceGrantChange {
        ServiceGrantChange::initial_with_state(self.state.clone())
    }

    /// Record a request. Accepted requests become pending.
    pub fn request(&mut self, id: ServiceGrantId, accepted: bool) -> ServiceGrantChange {
        if accepted {
            self.state.requesting_service_grant_ids.push(id);
        }
        debug!(id, accepted, pending = self.pending_len(), "service grant requested");
        self.change(ServiceGrantAction::RequestServiceGrant { id, accepted })
    }

    /// Resolve the oldest pending request for the response's id.
    ///
    /// Responses for ids with no pending request are dropped. A `Pending`
    /// status is published but keeps the request outstanding.
    pub fn response_received(
        &mut self,
        response: ServiceGrantResponse,
    ) -> Option<ServiceGrantChange> {
        let ids = &mut self.state.requesting_service_grant_ids;
        let Some(index) = ids.iter().position(|id| *id == response.service_grant_id) else {
            trace!(id = response.service_grant_id, "response for untracked service grant dropped");
            return None;
        };
        if response.status.is_final() {
            ids.remove(index);
        }
        debug!(
            id = response.service_grant_id,
            status = ?response.status,
            pending = self.pending_len(),
            "service grant response"
        );
        Some(self.change(ServiceGrantAction::ResponseReceived(response)))
    }

    /// Drop every pending request.
    pub fn reset(&mut self) -> ServiceGrantChange {
        self.state.requesting_service_grant_ids.clear();
        self.change(ServiceGrantAction::Reset)
    }

    fn pending_len(&self) -> usize {
        self.state.requesting_service_grant_ids.len()
    }

    fn change(&self, action: ServiceGrantAction) -> ServiceGrantChange {
        ServiceGrantChange { state: self.state.clone(), action }
    }
}
