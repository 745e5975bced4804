//! Simulated SORC.
//!
//! Implements the vehicle side of the link: MTU answers, lease token blob
//! acknowledgement, the SORC half of the challenge and encrypted service
//! grant responses. It is sans-IO like the phone session: data frames go in,
//! data frames come out.

use std::collections::HashMap;

use bytes::Bytes;
use tacs_core::{
    LeaseError, SessionError,
    challenger::rotate,
    crypto::{AesCbc, BLOCK_SIZE},
    lease::{LeaseToken, SessionKey},
    record::MessageCrypto,
};
use tacs_proto::{
    DataFrame, FrameAssembler, ServiceGrantId, SorcId, SorcMessage, SorcMessageId, fragment,
    payloads::{
        BlobRequest, LtBlobPayload, MtuReceive, PhoneToSorcChallenge, PhoneToSorcResponse,
        ServiceGrantRequest, ServiceGrantTrigger, SorcToPhoneResponse,
    },
};
use tracing::{debug, warn};

type Block = [u8; BLOCK_SIZE];

/// One scripted answer to a service grant request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResponse {
    /// Raw status byte
    pub status: u8,
    /// Response data
    pub response_data: String,
}

impl ScriptedResponse {
    /// Successful response with the given data.
    pub fn success(response_data: impl Into<String>) -> Self {
        Self { status: 0x00, response_data: response_data.into() }
    }

    /// Response with an arbitrary status byte.
    pub fn with_status(status: u8, response_data: impl Into<String>) -> Self {
        Self { status, response_data: response_data.into() }
    }
}

/// Simulated SORC configuration
#[derive(Debug, Clone)]
pub struct SimSorcConfig {
    /// MTU reported on `MtuRequest`
    pub mtu: u16,
    /// SORC nonce
    pub nr: Block,
    /// Flip one byte of b2 so the phone rejects the SORC
    pub tamper_b2: bool,
    /// Answer this many blobs with `BadChallengeSorcResponse` before acking
    pub reject_blobs: u32,
    /// Overrides the key from the lease token
    pub access_key: Option<Block>,
    /// Answers per service grant id; ids without a script get one empty success
    pub responses: HashMap<ServiceGrantId, Vec<ScriptedResponse>>,
}

impl Default for SimSorcConfig {
    fn default() -> Self {
        Self {
            mtu: 64,
            nr: std::array::from_fn(|i| 0xF0 ^ (i as u8)),
            tamper_b2: false,
            reject_blobs: 0,
            access_key: None,
            responses: HashMap::new(),
        }
    }
}

/// Progress of the SORC half of the handshake.
#[derive(Debug, Clone)]
enum Challenge {
    Idle,
    Responded { nc: Block, b2: Block },
    Established,
    Failed,
}

/// Simulated SORC peer.
#[derive(Debug)]
pub struct SimSorc {
    sorc_id: SorcId,
    cipher: AesCbc,
    config: SimSorcConfig,
    assembler: FrameAssembler,
    crypto: MessageCrypto,
    challenge: Challenge,
    session_key: Option<SessionKey>,
    blobs_rejected: u32,
    blobs_received: Vec<LtBlobPayload>,
    service_grants: Vec<ServiceGrantId>,
    phone_rejected: bool,
}

impl SimSorc {
    /// Create a SORC holding the lease token's shared key.
    pub fn new(lease_token: &LeaseToken, config: SimSorcConfig) -> Result<Self, LeaseError> {
        let cipher = match config.access_key {
            Some(key) => AesCbc::new(key),
            None => lease_token.shared_key()?.cipher(),
        };
        Ok(Self {
            sorc_id: lease_token.sorc_id,
            cipher,
            config,
            assembler: FrameAssembler::new(),
            crypto: MessageCrypto::Plain,
            challenge: Challenge::Idle,
            session_key: None,
            blobs_rejected: 0,
            blobs_received: Vec::new(),
            service_grants: Vec::new(),
            phone_rejected: false,
        })
    }

    /// Identity of this SORC.
    pub fn sorc_id(&self) -> SorcId {
        self.sorc_id
    }

    /// Whether the handshake finished on this side.
    pub fn is_established(&self) -> bool {
        matches!(self.challenge, Challenge::Established)
    }

    /// Session key derived by this side.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Blobs received since creation.
    pub fn blobs_received(&self) -> &[LtBlobPayload] {
        &self.blobs_received
    }

    /// Service grant requests received since creation, in order.
    pub fn service_grants(&self) -> &[ServiceGrantId] {
        &self.service_grants
    }

    /// Whether the phone reported that our challenge response did not match.
    pub fn phone_rejected(&self) -> bool {
        self.phone_rejected
    }

    /// Forget the link; keeps the counters.
    pub fn link_down(&mut self) {
        self.assembler.reset();
        self.crypto = MessageCrypto::Plain;
        self.challenge = Challenge::Idle;
        self.session_key = None;
        self.blobs_rejected = 0;
    }

    /// Handle one data frame from the phone; returns the frames to send back.
    pub fn receive_frame(&mut self, bytes: &[u8]) -> Result<Vec<Bytes>, SessionError> {
        let frame = DataFrame::decode(bytes)?;
        let Some(record) = self.assembler.push(frame)? else {
            return Ok(Vec::new());
        };
        let message = self.crypto.open(&record)?;
        debug!(id = ?message.id, "SORC received message");

        let replies = self.handle_message(&message)?;
        let mut frames = Vec::new();
        for reply in replies {
            frames.extend(self.frames(&reply)?);
        }
        Ok(frames)
    }

    /// Send an unsolicited service grant trigger to the phone.
    pub fn trigger(&mut self, trigger: &ServiceGrantTrigger) -> Result<Vec<Bytes>, SessionError> {
        let message = SorcMessage::new(SorcMessageId::ServiceGrantTrigger, trigger.encode()?);
        self.frames(&message)
    }

    fn frames(&self, message: &SorcMessage) -> Result<Vec<Bytes>, SessionError> {
        let record = self.crypto.seal(message)?;
        // Keep answering even with an unusable MTU so the phone can reject it.
        let payload_size =
            usize::from(self.config.mtu).saturating_sub(DataFrame::HEADER_SIZE).max(1);
        Ok(fragment(&record, payload_size)?.iter().map(DataFrame::encode).collect())
    }

    fn handle_message(&mut self, message: &SorcMessage) -> Result<Vec<SorcMessage>, SessionError> {
        let reply = match message.id {
            SorcMessageId::MtuRequest => vec![SorcMessage::new(
                SorcMessageId::MtuReceive,
                MtuReceive { mtu: self.config.mtu }.encode(),
            )],
            SorcMessageId::LtBlob => {
                let blob = LtBlobPayload::decode(&message.payload)?;
                let counter = blob.message_counter;
                self.blobs_received.push(blob);
                if self.blobs_rejected < self.config.reject_blobs {
                    self.blobs_rejected += 1;
                    let request = BlobRequest { blob_message_counter: Some(counter) };
                    vec![SorcMessage::new(SorcMessageId::BadChallengeSorcResponse, request.encode())]
                } else {
                    vec![SorcMessage::empty(SorcMessageId::LtAck)]
                }
            },
            SorcMessageId::ChallengePhone => {
                let challenge = PhoneToSorcChallenge::decode(&message.payload)?;
                vec![self.respond_to_challenge(&challenge.challenge)?]
            },
            SorcMessageId::ChallengePhoneResponse => {
                let response = PhoneToSorcResponse::decode(&message.payload)?;
                self.verify_phone(&response.response)?;
                Vec::new()
            },
            SorcMessageId::BadChallengePhoneResponse => {
                warn!("phone rejected SORC response");
                self.phone_rejected = true;
                self.challenge = Challenge::Failed;
                Vec::new()
            },
            SorcMessageId::ServiceGrant if self.is_established() => {
                let request = ServiceGrantRequest::decode(&message.payload)?;
                self.service_grant(request.service_grant_id)?
            },
            SorcMessageId::HeartbeatRequest => {
                vec![SorcMessage::empty(SorcMessageId::HeartbeatResponse)]
            },
            other => {
                debug!(id = ?other, "SORC ignored message");
                Vec::new()
            },
        };
        Ok(reply)
    }

    fn respond_to_challenge(&mut self, b0: &Block) -> Result<SorcMessage, SessionError> {
        let nc = self.cipher.decrypt_block(b0)?;
        let r1 = rotate(&nc, false);
        let b1 = self.cipher.encrypt_block(&xor(&self.config.nr, b0))?;
        let mut b2 = self.cipher.encrypt_block(&xor(&r1, &b1))?;
        if self.config.tamper_b2 {
            b2[0] ^= 0x01;
        }
        self.challenge = Challenge::Responded { nc, b2 };
        Ok(SorcMessage::new(
            SorcMessageId::ChallengeSorcResponse,
            SorcToPhoneResponse::new(b1, b2).encode(),
        ))
    }

    fn verify_phone(&mut self, b3: &Block) -> Result<(), SessionError> {
        let Challenge::Responded { nc, b2 } = self.challenge.clone() else {
            warn!("phone response without challenge");
            return Ok(());
        };
        let r4 = xor(&self.cipher.decrypt_block(b3)?, &b2);
        if rotate(&r4, true) != self.config.nr {
            warn!("phone response does not match");
            self.challenge = Challenge::Failed;
            return Ok(());
        }

        let nr = &self.config.nr;
        let mut key = [0u8; BLOCK_SIZE];
        key[0..4].copy_from_slice(&nr[0..4]);
        key[4..8].copy_from_slice(&nc[0..4]);
        key[8..12].copy_from_slice(&nr[12..16]);
        key[12..16].copy_from_slice(&nc[12..16]);
        let key = SessionKey::new(key);

        self.crypto = MessageCrypto::with_session_key(&key);
        self.session_key = Some(key);
        self.challenge = Challenge::Established;
        debug!("SORC established session");
        Ok(())
    }

    fn service_grant(&mut self, id: ServiceGrantId) -> Result<Vec<SorcMessage>, SessionError> {
        self.service_grants.push(id);
        let script = self
            .config
            .responses
            .get(&id)
            .cloned()
            .unwrap_or_else(|| vec![ScriptedResponse::success("")]);
        script
            .into_iter()
            .map(|response| {
                let trigger = ServiceGrantTrigger {
                    service_grant_id: id,
                    status: response.status,
                    response_data: response.response_data,
                };
                Ok(SorcMessage::new(SorcMessageId::ServiceGrantTrigger, trigger.encode()?))
            })
            .collect()
    }
}

fn xor(a: &Block, b: &Block) -> Block {
    std::array::from_fn(|i| a[i] ^ b[i])
}

#[cfg(test)]
mod tests {
    use tacs_core::{SystemEnv, challenger::{ChallengeAction, Challenger}};

    use super::*;

    fn token() -> LeaseToken {
        LeaseToken {
            id: "token".into(),
            lease_id: "lease".into(),
            sorc_id: SorcId::from_bytes([3; 16]),
            sorc_access_key: "000102030405060708090a0b0c0d0e0f".into(),
        }
    }

    fn decode_all(sorc: &SimSorc, frames: &[Bytes]) -> Vec<SorcMessage> {
        let mut assembler = FrameAssembler::new();
        frames
            .iter()
            .filter_map(|bytes| assembler.push(DataFrame::decode(bytes).unwrap()).unwrap())
            .map(|record| sorc.crypto.open(&record).unwrap())
            .collect()
    }

    fn send(sorc: &mut SimSorc, message: &SorcMessage) -> Vec<SorcMessage> {
        let mut replies = Vec::new();
        for frame in fragment(&message.encode(), 16).unwrap() {
            replies.extend(sorc.receive_frame(&frame.encode()).unwrap());
        }
        decode_all(sorc, &replies)
    }

    #[test]
    fn answers_mtu_request() {
        let mut sorc = SimSorc::new(&token(), SimSorcConfig::default()).unwrap();
        let replies = send(&mut sorc, &SorcMessage::empty(SorcMessageId::MtuRequest));
        assert_eq!(replies.len(), 1);
        assert_eq!(MtuReceive::decode(&replies[0].payload).unwrap().mtu, 64);
    }

    #[test]
    fn rejects_configured_number_of_blobs() {
        let config = SimSorcConfig { reject_blobs: 1, ..Default::default() };
        let mut sorc = SimSorc::new(&token(), config).unwrap();
        let blob = LtBlobPayload { message_counter: 9, blob: Bytes::from_static(b"blob") };
        let message = SorcMessage::new(SorcMessageId::LtBlob, blob.encode());

        let first = send(&mut sorc, &message);
        assert_eq!(first[0].id, SorcMessageId::BadChallengeSorcResponse);
        assert_eq!(BlobRequest::decode(&first[0].payload).blob_message_counter, Some(9));

        let second = send(&mut sorc, &message);
        assert_eq!(second[0].id, SorcMessageId::LtAck);
        assert_eq!(sorc.blobs_received().len(), 2);
    }

    #[test]
    fn completes_handshake_with_challenger() {
        let mut sorc = SimSorc::new(&token(), SimSorcConfig::default()).unwrap();
        let mut phone = Challenger::new(&token(), &SystemEnv).unwrap();

        let [ChallengeAction::SendMessage(b0)]: [ChallengeAction; 1] = phone.begin().unwrap().try_into().unwrap() else {
            panic!("expected challenge");
        };
        let replies = send(&mut sorc, &b0);
        let actions = phone.handle_received(&replies[0]).unwrap();
        let [ChallengeAction::SendMessage(b3)] = actions.as_slice() else {
            panic!("expected phone response, got {actions:?}");
        };
        assert!(send(&mut sorc, b3).is_empty());
        assert!(sorc.is_established());

        let [ChallengeAction::Finished(key)]: [ChallengeAction; 1] = phone.handle_sent(b3).try_into().unwrap() else {
            panic!("expected session key");
        };
        assert_eq!(Some(&key), sorc.session_key());
    }
}
