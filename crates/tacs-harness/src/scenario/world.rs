//! World state for scenario execution.
//!
//! The World owns the phone session and the simulated SORC, moves frames
//! between them and records everything an oracle may want to check.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tacs_core::{
    SessionError,
    service_grant::ServiceGrantChange,
    session::{Session, SessionAction, SessionState},
    transport::{LinkState, TransportEvent},
};
use tacs_proto::ServiceGrantId;
use tracing::debug;

use crate::{SimEnv, SimSorc};

/// Direction of a frame on the simulated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Phone to SORC
    Uplink,
    /// SORC to phone
    Downlink,
}

/// World state containing both ends of the link and what happened between them.
pub struct World {
    phone_name: String,
    sorc_name: String,
    phone: Session<SimEnv>,
    sorc: SimSorc,
    link_up: bool,
    frames_sent: HashMap<String, usize>,
    frames_received: HashMap<String, usize>,
    transcript: Vec<(Direction, Bytes)>,
    states: Vec<SessionState>,
    changes: Vec<ServiceGrantChange>,
    failures: Vec<SessionError>,
    dropped: Vec<SessionError>,
    requested: Vec<ServiceGrantId>,
}

impl World {
    /// World with one phone and one SORC.
    pub fn new(
        phone_name: impl Into<String>,
        phone: Session<SimEnv>,
        sorc_name: impl Into<String>,
        sorc: SimSorc,
    ) -> Self {
        Self {
            phone_name: phone_name.into(),
            sorc_name: sorc_name.into(),
            phone,
            sorc,
            link_up: false,
            frames_sent: HashMap::new(),
            frames_received: HashMap::new(),
            transcript: Vec::new(),
            states: Vec::new(),
            changes: Vec::new(),
            failures: Vec::new(),
            dropped: Vec::new(),
            requested: Vec::new(),
        }
    }

    /// Phone session by name.
    pub fn phone(&self, name: &str) -> Option<&Session<SimEnv>> {
        (name == self.phone_name).then_some(&self.phone)
    }

    /// Simulated SORC by name.
    pub fn sorc(&self, name: &str) -> Option<&SimSorc> {
        (name == self.sorc_name).then_some(&self.sorc)
    }

    /// The phone session.
    pub fn phone_session(&self) -> &Session<SimEnv> {
        &self.phone
    }

    /// The phone session, for driving further steps.
    pub fn phone_session_mut(&mut self) -> &mut Session<SimEnv> {
        &mut self.phone
    }

    /// The simulated SORC.
    pub fn sorc_peer(&self) -> &SimSorc {
        &self.sorc
    }

    /// Whether the simulated link is up.
    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// Frames sent by an actor.
    pub fn frames_sent(&self, actor: &str) -> usize {
        self.frames_sent.get(actor).copied().unwrap_or(0)
    }

    /// Frames received by an actor.
    pub fn frames_received(&self, actor: &str) -> usize {
        self.frames_received.get(actor).copied().unwrap_or(0)
    }

    /// Every frame on the link, in order.
    pub fn transcript(&self) -> &[(Direction, Bytes)] {
        &self.transcript
    }

    /// Session states reported by the phone, in order.
    pub fn states(&self) -> &[SessionState] {
        &self.states
    }

    /// Service grant changes published by the phone, in order.
    pub fn changes(&self) -> &[ServiceGrantChange] {
        &self.changes
    }

    /// Fatal session failures.
    pub fn failures(&self) -> &[SessionError] {
        &self.failures
    }

    /// Non-fatal decode errors on either end.
    pub fn dropped(&self) -> &[SessionError] {
        &self.dropped
    }

    /// Service grants the phone sent while established.
    pub fn requested_service_grants(&self) -> &[ServiceGrantId] {
        &self.requested
    }

    /// Request a service grant and run the link until it is quiet.
    pub fn request_service_grant(&mut self, id: ServiceGrantId) -> Result<(), SessionError> {
        if self.phone.is_established() {
            self.requested.push(id);
        }
        let actions = self.phone.request_service_grant(id)?;
        self.drive(actions);
        Ok(())
    }

    /// Drop the link from the SORC side.
    pub fn drop_link(&mut self) {
        if !self.link_up {
            return;
        }
        self.link_up = false;
        self.sorc.link_down();
        let actions = self.event(TransportEvent::LinkStateChanged(LinkState::Disconnected));
        self.drive(actions);
    }

    /// Execute session actions, feeding transport events back until the
    /// link is quiet.
    pub fn drive(&mut self, actions: Vec<SessionAction>) {
        let mut queue: VecDeque<SessionAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Connect(sorc_id) => {
                    let state = if sorc_id == self.sorc.sorc_id() {
                        self.link_up = true;
                        LinkState::Connected
                    } else {
                        LinkState::Disconnected
                    };
                    queue.extend(self.event(TransportEvent::LinkStateChanged(state)));
                },
                SessionAction::Disconnect => {
                    if self.link_up {
                        self.link_up = false;
                        self.sorc.link_down();
                    }
                },
                SessionAction::Send(frame) => queue.extend(self.uplink(frame)),
                SessionAction::StateChanged(state) => self.states.push(state),
                SessionAction::ServiceGrantChanged(change) => self.changes.push(change),
                SessionAction::Failed(error) => {
                    debug!(%error, "phone session failed");
                    self.failures.push(error);
                },
            }
        }
    }

    fn uplink(&mut self, frame: Bytes) -> Vec<SessionAction> {
        if !self.link_up {
            return Vec::new();
        }
        self.count(Direction::Uplink);
        let replies = match self.sorc.receive_frame(&frame) {
            Ok(replies) => replies,
            Err(error) => {
                self.dropped.push(error);
                Vec::new()
            },
        };
        self.transcript.push((Direction::Uplink, frame));

        let mut actions = self.event(TransportEvent::DataSent);
        for reply in replies {
            self.count(Direction::Downlink);
            self.transcript.push((Direction::Downlink, reply.clone()));
            actions.extend(self.event(TransportEvent::BytesReceived(reply)));
        }
        actions
    }

    fn event(&mut self, event: TransportEvent) -> Vec<SessionAction> {
        match self.phone.handle_event(event) {
            Ok(actions) => actions,
            Err(error) => {
                self.dropped.push(error);
                Vec::new()
            },
        }
    }

    fn count(&mut self, direction: Direction) {
        let (from, to) = match direction {
            Direction::Uplink => (&self.phone_name, &self.sorc_name),
            Direction::Downlink => (&self.sorc_name, &self.phone_name),
        };
        *self.frames_sent.entry(from.clone()).or_insert(0) += 1;
        *self.frames_received.entry(to.clone()).or_insert(0) += 1;
    }
}
