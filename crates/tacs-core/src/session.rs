//! Session state machine for one SORC link.
//!
//! Glues the frame codec, the handshake, record encryption and the service
//! grant bus together. Like the [`Challenger`], it performs no I/O: transport
//! events go in, [`SessionAction`]s come out.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐ link up ┌────────────────┐ MtuReceive ┌─────────────┐ key ┌─────────────┐
//! │ Disconnected │────────>│ Connecting │────────>│ NegotiatingMtu │───────────>│ Challenging │────>│ Established │
//! └──────────────┘         └────────────┘         └────────────────┘            └─────────────┘     └─────────────┘
//!        ↑                                  (skipped unless negotiate_mtu)                                 │
//!        └──────────────────────── link down / disconnect / handshake failure ────────────────────────────┘
//! ```
//!
//! # Link sequence
//!
//! 1. Optional MTU negotiation (`MtuRequest` / `MtuReceive`)
//! 2. Lease token blob (`LtBlob`); the SORC answers with `LtAck`
//! 3. Challenge-response handshake; the session key is installed once the
//!    final response has been sent
//! 4. Encrypted service grant traffic
//!
//! Outbound messages are fragmented into data frames and written one frame at
//! a time: the next frame is released only after the transport reports
//! [`TransportEvent::DataSent`]. A message is sealed when it reaches the head
//! of the queue, so anything queued behind the final handshake response goes
//! out under the session key.

use std::{collections::VecDeque, time::Instant};

use bytes::Bytes;
use tacs_proto::{
    DataFrame, FrameAssembler, ServiceGrantId, SorcId, SorcMessage, SorcMessageId, fragment,
    payloads::{LtBlobPayload, MtuReceive, ServiceGrantRequest, ServiceGrantTrigger},
};
use tracing::{debug, info, warn};

use crate::{
    challenger::{ChallengeAction, Challenger},
    env::Environment,
    error::SessionError,
    lease::{LeaseToken, LeaseTokenBlob},
    record::MessageCrypto,
    service_grant::{ServiceGrantBus, ServiceGrantChange, ServiceGrantResponse},
    transport::{LinkState, TransportEvent},
};

/// Actions returned by the session.
///
/// The runtime executes these in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Ask the transport to connect
    Connect(SorcId),

    /// Ask the transport to disconnect
    Disconnect,

    /// Write one encoded data frame
    Send(Bytes),

    /// Session state changed
    StateChanged(SessionState),

    /// Publish a service grant change
    ServiceGrantChanged(ServiceGrantChange),

    /// Session failed; it has been torn down
    Failed(SessionError),
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link
    Disconnected,
    /// Waiting for the transport to report the link up
    Connecting,
    /// Waiting for the SORC MTU
    NegotiatingMtu,
    /// Blob transfer and handshake running
    Challenging,
    /// Session key installed
    Established,
}

/// Bound on lease token blob transmissions per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRetryPolicy {
    /// Total blob transmissions allowed, the first one included
    pub max_attempts: u32,
}

impl Default for BlobRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Transport write size in bytes (frame header included) until an MTU is
    /// negotiated
    pub frame_size: usize,
    /// Ask the SORC for its MTU after link-up
    pub negotiate_mtu: bool,
    /// Upper bound for a negotiated frame size
    pub max_frame_size: usize,
    /// Blob retransmission bound
    pub blob_retry: BlobRetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_size: 20,
            negotiate_mtu: true,
            max_frame_size: 512,
            blob_retry: BlobRetryPolicy::default(),
        }
    }
}

/// One outbound message and its not yet written frames.
///
/// `frames` stays `None` until the message is sealed at the head of the queue.
#[derive(Debug)]
struct Outbound {
    message: SorcMessage,
    frames: Option<VecDeque<Bytes>>,
}

/// Credentials for the current connection.
#[derive(Debug)]
struct Lease {
    sorc_id: SorcId,
    blob: LeaseTokenBlob,
}

/// Session state machine
///
/// Manages one connection to one SORC.
#[derive(Debug)]
pub struct Session<E: Environment> {
    env: E,
    config: SessionConfig,
    state: SessionState,
    frame_size: usize,
    lease: Option<Lease>,
    challenger: Option<Challenger>,
    crypto: MessageCrypto,
    assembler: FrameAssembler,
    outbound: VecDeque<Outbound>,
    in_flight: bool,
    blob_attempts: u32,
    challenge_started: Option<Instant>,
    bus: ServiceGrantBus,
}

impl<E: Environment> Session<E> {
    /// Create a disconnected session.
    pub fn new(env: E, config: SessionConfig) -> Self {
        let frame_size = config.frame_size;
        Self {
            env,
            config,
            state: SessionState::Disconnected,
            frame_size,
            lease: None,
            challenger: None,
            crypto: MessageCrypto::Plain,
            assembler: FrameAssembler::new(),
            outbound: VecDeque::new(),
            in_flight: false,
            blob_attempts: 0,
            challenge_started: None,
            bus: ServiceGrantBus::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a session key is installed.
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Current transport write size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Lease token blob transmissions on this connection.
    pub fn blob_attempts(&self) -> u32 {
        self.blob_attempts
    }

    /// SORC of the current connection.
    pub fn sorc_id(&self) -> Option<SorcId> {
        self.lease.as_ref().map(|lease| lease.sorc_id)
    }

    /// Change describing the pending service grants, for late subscribers.
    pub fn initial_change(&self) -> ServiceGrantChange {
        self.bus.initial()
    }

    /// Start connecting with a lease token.
    ///
    /// The lease token is validated before any transport activity.
    pub fn connect(
        &mut self,
        lease_token: &LeaseToken,
        blob: LeaseTokenBlob,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(self.invalid_state("connect"));
        }

        let challenger = Challenger::new(lease_token, &self.env)?;
        let sorc_id = lease_token.sorc_id;
        self.challenger = Some(challenger);
        self.lease = Some(Lease { sorc_id, blob });
        self.frame_size = self.config.frame_size;
        self.state = SessionState::Connecting;
        info!(%sorc_id, "connecting");

        Ok(vec![SessionAction::StateChanged(self.state), SessionAction::Connect(sorc_id)])
    }

    /// Tear the session down and ask the transport to disconnect.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }
        let mut actions = self.teardown();
        actions.push(SessionAction::Disconnect);
        actions
    }

    /// Request a service grant.
    ///
    /// Without an established session the request is refused and published
    /// as not accepted.
    pub fn request_service_grant(
        &mut self,
        id: ServiceGrantId,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if !self.is_established() {
            debug!(id, state = ?self.state, "service grant refused, no session");
            return Ok(vec![SessionAction::ServiceGrantChanged(self.bus.request(id, false))]);
        }

        let message = SorcMessage::new(
            SorcMessageId::ServiceGrant,
            ServiceGrantRequest { service_grant_id: id }.encode(),
        );
        let mut actions = self.enqueue(message);
        actions.push(SessionAction::ServiceGrantChanged(self.bus.request(id, true)));
        Ok(actions)
    }

    /// Send a keep-alive request.
    pub fn heartbeat(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if !self.is_established() {
            return Err(self.invalid_state("heartbeat"));
        }
        Ok(self.enqueue(SorcMessage::empty(SorcMessageId::HeartbeatRequest)))
    }

    /// Handle a transport event.
    ///
    /// Errors are non-fatal decode failures; the partial message is dropped
    /// and the session stays up. Fatal failures are reported as
    /// [`SessionAction::Failed`].
    pub fn handle_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            TransportEvent::LinkStateChanged(LinkState::Connected) => Ok(self.link_up()),
            TransportEvent::LinkStateChanged(LinkState::Connecting) => Ok(Vec::new()),
            TransportEvent::LinkStateChanged(LinkState::Disconnected) => {
                if self.state == SessionState::Disconnected {
                    return Ok(Vec::new());
                }
                info!("link lost");
                Ok(self.teardown())
            },
            TransportEvent::BytesReceived(bytes) => self.bytes_received(&bytes),
            TransportEvent::DataSent => Ok(self.data_sent()),
        }
    }

    fn link_up(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "unexpected link up");
            return Vec::new();
        }

        if self.config.negotiate_mtu {
            self.state = SessionState::NegotiatingMtu;
            let mut actions = vec![SessionAction::StateChanged(self.state)];
            actions.extend(self.enqueue(SorcMessage::empty(SorcMessageId::MtuRequest)));
            actions
        } else {
            self.start_challenge()
        }
    }

    fn start_challenge(&mut self) -> Vec<SessionAction> {
        self.state = SessionState::Challenging;
        self.challenge_started = Some(self.env.now());
        let mut actions = vec![SessionAction::StateChanged(self.state)];
        actions.extend(self.send_blob(None));
        actions
    }

    fn send_blob(&mut self, latest_counter: Option<u32>) -> Vec<SessionAction> {
        let Some(blob) = self.lease.as_ref().map(|lease| lease.blob.clone()) else {
            return self.fail(self.invalid_state("send_blob"));
        };

        if self.blob_attempts >= self.config.blob_retry.max_attempts {
            warn!(attempts = self.blob_attempts, "lease token blob rejected too often");
            return self.fail(SessionError::BlobRetriesExhausted { attempts: self.blob_attempts });
        }
        if let Some(latest) = latest_counter {
            if latest > blob.message_counter {
                warn!(latest, ours = blob.message_counter, "SORC knows a newer blob");
            }
        }

        self.blob_attempts += 1;
        debug!(attempt = self.blob_attempts, counter = blob.message_counter, "sending blob");
        let payload = LtBlobPayload { message_counter: blob.message_counter, blob: blob.data };
        self.enqueue(SorcMessage::new(SorcMessageId::LtBlob, payload.encode()))
    }

    fn bytes_received(&mut self, bytes: &[u8]) -> Result<Vec<SessionAction>, SessionError> {
        if self.state == SessionState::Disconnected {
            warn!(len = bytes.len(), "bytes received while disconnected");
            return Ok(Vec::new());
        }

        let frame = DataFrame::decode(bytes)?;
        let Some(record) = self.assembler.push(frame)? else {
            return Ok(Vec::new());
        };
        let message = self.crypto.open(&record)?;
        debug!(id = ?message.id, len = message.payload.len(), "message received");

        self.message_received(message)
    }

    fn message_received(
        &mut self,
        message: SorcMessage,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match (self.state, message.id) {
            (_, SorcMessageId::HeartbeatRequest) => {
                Ok(self.enqueue(SorcMessage::empty(SorcMessageId::HeartbeatResponse)))
            },
            (_, SorcMessageId::HeartbeatResponse) => Ok(Vec::new()),
            (SessionState::NegotiatingMtu, SorcMessageId::MtuReceive) => {
                let mtu = MtuReceive::decode(&message.payload)?.mtu;
                if usize::from(mtu) <= DataFrame::HEADER_SIZE {
                    return Ok(self.fail(SessionError::MtuTooSmall(mtu)));
                }
                self.frame_size = usize::from(mtu).min(self.config.max_frame_size);
                debug!(mtu, frame_size = self.frame_size, "MTU negotiated");
                Ok(self.start_challenge())
            },
            (SessionState::Challenging, _) => Ok(self.challenge_received(&message)),
            (SessionState::Established, SorcMessageId::ServiceGrantTrigger) => {
                let trigger = ServiceGrantTrigger::decode(&message.payload)?;
                let Some(sorc_id) = self.sorc_id() else {
                    return Ok(Vec::new());
                };
                let Some(response) = ServiceGrantResponse::from_trigger(sorc_id, trigger) else {
                    warn!("service grant trigger with unknown status dropped");
                    return Ok(Vec::new());
                };
                Ok(self
                    .bus
                    .response_received(response)
                    .map(SessionAction::ServiceGrantChanged)
                    .into_iter()
                    .collect())
            },
            (state, id) => {
                debug!(?state, ?id, "message ignored");
                Ok(Vec::new())
            },
        }
    }

    fn challenge_received(&mut self, message: &SorcMessage) -> Vec<SessionAction> {
        let Some(challenger) = self.challenger.as_mut() else {
            return self.fail(self.invalid_state("challenge_received"));
        };
        match challenger.handle_received(message) {
            Ok(actions) => self.apply_challenge_actions(actions),
            Err(error) => self.fail(error.into()),
        }
    }

    fn apply_challenge_actions(&mut self, actions: Vec<ChallengeAction>) -> Vec<SessionAction> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                ChallengeAction::SendMessage(message) => out.extend(self.enqueue(message)),
                ChallengeAction::SendBlob { latest_counter } => {
                    out.extend(self.send_blob(latest_counter));
                },
                ChallengeAction::Finished(key) => {
                    self.crypto = MessageCrypto::with_session_key(&key);
                    self.challenger = None;
                    self.state = SessionState::Established;
                    let elapsed_ms = self
                        .challenge_started
                        .take()
                        .map(|start| self.env.now().saturating_duration_since(start).as_millis());
                    info!(?elapsed_ms, key_len = key.as_bytes().len(), "session established");
                    out.push(SessionAction::StateChanged(self.state));
                },
                ChallengeAction::Aborted(error) => out.extend(self.fail(error.into())),
            }
            if self.state == SessionState::Disconnected {
                break;
            }
        }
        out
    }

    fn data_sent(&mut self) -> Vec<SessionAction> {
        if !self.in_flight {
            return Vec::new();
        }
        self.in_flight = false;

        let mut actions = Vec::new();
        let finished = self
            .outbound
            .front()
            .is_some_and(|outbound| outbound.frames.as_ref().is_some_and(VecDeque::is_empty));
        if finished {
            if let Some(done) = self.outbound.pop_front() {
                actions.extend(self.message_sent(&done.message));
            }
        }
        if self.state != SessionState::Disconnected {
            actions.extend(self.send_next_frame());
        }
        actions
    }

    fn message_sent(&mut self, message: &SorcMessage) -> Vec<SessionAction> {
        debug!(id = ?message.id, "message sent");
        match self.challenger.as_mut() {
            Some(challenger) if self.state == SessionState::Challenging => {
                let actions = challenger.handle_sent(message);
                self.apply_challenge_actions(actions)
            },
            _ => Vec::new(),
        }
    }

    fn enqueue(&mut self, message: SorcMessage) -> Vec<SessionAction> {
        self.outbound.push_back(Outbound { message, frames: None });
        self.send_next_frame()
    }

    fn send_next_frame(&mut self) -> Vec<SessionAction> {
        if self.in_flight {
            return Vec::new();
        }
        let Some(outbound) = self.outbound.front_mut() else {
            return Vec::new();
        };
        if outbound.frames.is_none() {
            match seal_frames(&self.crypto, self.frame_size, &outbound.message) {
                Ok(frames) => outbound.frames = Some(frames),
                Err(error) => return self.fail(error),
            }
        }

        let Some(frame) =
            self.outbound.front_mut().and_then(|outbound| outbound.frames.as_mut()?.pop_front())
        else {
            return Vec::new();
        };
        self.in_flight = true;
        vec![SessionAction::Send(frame)]
    }

    fn fail(&mut self, error: SessionError) -> Vec<SessionAction> {
        warn!(%error, state = ?self.state, "session failed");
        let mut actions = vec![SessionAction::Failed(error)];
        actions.extend(self.teardown());
        actions.push(SessionAction::Disconnect);
        actions
    }

    fn teardown(&mut self) -> Vec<SessionAction> {
        if let Some(challenger) = self.challenger.as_mut() {
            challenger.cancel();
        }
        self.challenger = None;
        self.lease = None;
        self.crypto = MessageCrypto::Plain;
        self.assembler.reset();
        self.outbound.clear();
        self.in_flight = false;
        self.blob_attempts = 0;
        self.challenge_started = None;
        self.frame_size = self.config.frame_size;
        self.state = SessionState::Disconnected;

        vec![
            SessionAction::StateChanged(self.state),
            SessionAction::ServiceGrantChanged(self.bus.reset()),
        ]
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState { state: self.state, operation }
    }
}

/// Seal `message` with the current record protection and cut it into
/// encoded frames of `frame_size` bytes.
fn seal_frames(
    crypto: &MessageCrypto,
    frame_size: usize,
    message: &SorcMessage,
) -> Result<VecDeque<Bytes>, SessionError> {
    let record = crypto.seal(message)?;
    let payload_size = frame_size.saturating_sub(DataFrame::HEADER_SIZE);
    Ok(fragment(&record, payload_size)?.iter().map(DataFrame::encode).collect())
}

#[cfg(test)]
mod tests {
    use tacs_proto::reassemble;

    use super::*;
    use crate::{SystemEnv, error::ChallengeError, service_grant::ServiceGrantAction};

    fn token() -> LeaseToken {
        LeaseToken {
            id: "token".into(),
            lease_id: "lease".into(),
            sorc_id: SorcId::from_bytes([7; 16]),
            sorc_access_key: "1a45467ba4a5f1d2e4e5c4f8b8a3c2d1".into(),
        }
    }

    fn blob() -> LeaseTokenBlob {
        LeaseTokenBlob { message_counter: 4, data: Bytes::from_static(b"signed-blob") }
    }

    fn frames(actions: &[SessionAction]) -> Vec<DataFrame> {
        actions
            .iter()
            .filter_map(|action| match action {
                SessionAction::Send(bytes) => Some(DataFrame::decode(bytes).unwrap()),
                _ => None,
            })
            .collect()
    }

    /// Drive stop-and-wait until the outbound queue is drained.
    fn drain(session: &mut Session<SystemEnv>, mut actions: Vec<SessionAction>) -> Vec<SorcMessage> {
        let mut sent = Vec::new();
        let mut pending = Vec::new();
        while !frames(&actions).is_empty() {
            let frame = frames(&actions).remove(0);
            let last = frame.kind.completes_message();
            pending.push(frame);
            if last {
                sent.push(SorcMessage::decode(&reassemble(&pending).unwrap()).unwrap());
                pending.clear();
            }
            actions = session.handle_event(TransportEvent::DataSent).unwrap();
        }
        sent
    }

    fn receive(session: &mut Session<SystemEnv>, message: &SorcMessage) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        let record = message.encode();
        for frame in fragment(&record, 16).unwrap() {
            actions.extend(
                session.handle_event(TransportEvent::BytesReceived(frame.encode())).unwrap(),
            );
        }
        actions
    }

    fn connected(config: SessionConfig) -> (Session<SystemEnv>, Vec<SessionAction>) {
        let mut session = Session::new(SystemEnv, config);
        session.connect(&token(), blob()).unwrap();
        let actions =
            session.handle_event(TransportEvent::LinkStateChanged(LinkState::Connected)).unwrap();
        (session, actions)
    }

    #[test]
    fn connect_validates_lease_token_first() {
        let mut session = Session::new(SystemEnv, SessionConfig::default());
        let mut bad = token();
        bad.sorc_access_key = "abc".into();
        assert!(matches!(
            session.connect(&bad, blob()),
            Err(SessionError::Challenge(ChallengeError::InvalidLeaseToken(_)))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn connect_emits_connect_action() {
        let mut session = Session::new(SystemEnv, SessionConfig::default());
        let actions = session.connect(&token(), blob()).unwrap();
        assert_eq!(
            actions,
            vec![
                SessionAction::StateChanged(SessionState::Connecting),
                SessionAction::Connect(SorcId::from_bytes([7; 16])),
            ]
        );
        assert!(matches!(session.connect(&token(), blob()), Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn link_up_negotiates_mtu_then_sends_blob() {
        let (mut session, actions) = connected(SessionConfig::default());
        assert_eq!(session.state(), SessionState::NegotiatingMtu);
        assert_eq!(drain(&mut session, actions)[0].id, SorcMessageId::MtuRequest);

        let mtu = SorcMessage::new(SorcMessageId::MtuReceive, MtuReceive { mtu: 64 }.encode());
        let actions = receive(&mut session, &mtu);
        assert_eq!(session.state(), SessionState::Challenging);
        assert_eq!(session.frame_size(), 64);

        let sent = drain(&mut session, actions);
        assert_eq!(sent[0].id, SorcMessageId::LtBlob);
        let payload = LtBlobPayload::decode(&sent[0].payload).unwrap();
        assert_eq!(payload.message_counter, 4);
        assert_eq!(payload.blob.as_ref(), b"signed-blob");
    }

    #[test]
    fn tiny_mtu_fails_session() {
        let (mut session, actions) = connected(SessionConfig::default());
        drain(&mut session, actions);

        let mtu = SorcMessage::new(SorcMessageId::MtuReceive, MtuReceive { mtu: 4 }.encode());
        let actions = receive(&mut session, &mtu);
        assert!(actions.contains(&SessionAction::Failed(SessionError::MtuTooSmall(4))));
        assert_eq!(actions.last(), Some(&SessionAction::Disconnect));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn frames_are_released_one_at_a_time() {
        let config = SessionConfig { negotiate_mtu: false, frame_size: 8, ..Default::default() };
        let (mut session, actions) = connected(config);

        // Blob message is 1 + 4 + 11 bytes, 4 payload bytes per frame
        assert_eq!(frames(&actions).len(), 1);
        assert_eq!(frames(&actions)[0].kind, tacs_proto::DataFrameKind::Start);

        let next = session.handle_event(TransportEvent::DataSent).unwrap();
        assert_eq!(frames(&next).len(), 1);
        assert_eq!(frames(&next)[0].sequence_number, 1);
    }

    #[test]
    fn blob_retries_are_bounded() {
        let config = SessionConfig {
            negotiate_mtu: false,
            blob_retry: BlobRetryPolicy { max_attempts: 2 },
            ..Default::default()
        };
        let (mut session, actions) = connected(config);
        drain(&mut session, actions);
        assert_eq!(session.blob_attempts(), 1);

        let reject = SorcMessage::empty(SorcMessageId::BadChallengeSorcResponse);
        let actions = receive(&mut session, &reject);
        let sent = drain(&mut session, actions);
        assert_eq!(sent[0].id, SorcMessageId::LtBlob);
        assert_eq!(session.blob_attempts(), 2);

        let actions = receive(&mut session, &reject);
        assert!(
            actions.contains(&SessionAction::Failed(SessionError::BlobRetriesExhausted {
                attempts: 2
            }))
        );
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn service_grant_refused_without_session() {
        let mut session = Session::new(SystemEnv, SessionConfig::default());
        let actions = session.request_service_grant(2).unwrap();
        let [SessionAction::ServiceGrantChanged(change)] = actions.as_slice() else {
            panic!("expected one change, got {actions:?}");
        };
        assert_eq!(change.action, ServiceGrantAction::RequestServiceGrant { id: 2, accepted: false });
        assert!(change.state.requesting_service_grant_ids.is_empty());
    }

    #[test]
    fn link_loss_resets_session() {
        let config = SessionConfig { negotiate_mtu: false, ..Default::default() };
        let (mut session, _) = connected(config);

        let actions = session
            .handle_event(TransportEvent::LinkStateChanged(LinkState::Disconnected))
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(actions.iter().any(|action| matches!(
            action,
            SessionAction::ServiceGrantChanged(ServiceGrantChange {
                action: ServiceGrantAction::Reset,
                ..
            })
        )));
        assert!(session.handle_event(TransportEvent::DataSent).unwrap().is_empty());
    }

    #[test]
    fn heartbeat_request_is_answered() {
        let config = SessionConfig { negotiate_mtu: false, ..Default::default() };
        let (mut session, actions) = connected(config);
        drain(&mut session, actions);

        let actions = receive(&mut session, &SorcMessage::empty(SorcMessageId::HeartbeatRequest));
        let sent = drain(&mut session, actions);
        assert_eq!(sent, vec![SorcMessage::empty(SorcMessageId::HeartbeatResponse)]);
        assert_eq!(session.state(), SessionState::Challenging);
    }

    #[test]
    fn corrupt_frame_is_reported_not_fatal() {
        let config = SessionConfig { negotiate_mtu: false, ..Default::default() };
        let (mut session, _) = connected(config);

        let result = session.handle_event(TransportEvent::BytesReceived(Bytes::from_static(&[
            0x00, 0, 1, 0, 0xAA,
        ])));
        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert_eq!(session.state(), SessionState::Challenging);
    }
}
