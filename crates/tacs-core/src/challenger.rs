//! Mutual challenge-response handshake.
//!
//! Phone and SORC share a 16-byte AES key from the lease token. Each side
//! proves it holds the key by returning the other side's nonce in permuted
//! form, and both derive the same session key from the two nonces.
//!
//! # Protocol
//!
//! ```text
//! Phone                                         SORC
//!   nc = random(16)
//!   b0 = enc(nc)            ── ChallengePhone ──>
//!                                                 r1 = rotate(dec(b0))
//!                                                 b1 = enc(nr ⊕ b0)
//!                           <─ ChallengeSorcResponse ─  b2 = enc(r1 ⊕ b1)
//!   r3 = dec(b2) ⊕ b1
//!   check rotate⁻¹(r3) == nc
//!   nr = dec(b1) ⊕ b0
//!   b3 = enc(rotate(nr) ⊕ b2) ── ChallengePhoneResponse ──>
//!                                                 check rotate⁻¹(dec(b3) ⊕ b2) == nr
//!   ks = nr[0..4] ‖ nc[0..4] ‖ nr[12..16] ‖ nc[12..16]
//! ```
//!
//! The session key is released only once the transport confirms that the
//! final `ChallengePhoneResponse` went out.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ begin  ┌──────────────────────┐ b1,b2 ok ┌──────────────────────────┐ sent  ┌────────────────────┐
//! │ Idle │───────>│ AwaitingPeerResponse │─────────>│ AwaitingSendConfirmation │──────>│ SessionEstablished │
//! └──────┘        └──────────────────────┘          └──────────────────────────┘       └────────────────────┘
//!    ↑  BadChallenge   │      │ mismatch / corrupt / unexpected / cancel
//!    └─────────────────┘      ↓
//!                        ┌─────────┐
//!                        │ Aborted │
//!                        └─────────┘
//! ```
//!
//! Nonces live in one `HandshakeSecrets` value that is wiped on every
//! terminal transition.

use tacs_proto::{
    ProtocolError, SorcMessage, SorcMessageId,
    payloads::{BlobRequest, PhoneToSorcChallenge, PhoneToSorcResponse, SorcToPhoneResponse},
};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    crypto::{AesCbc, BLOCK_SIZE},
    env::Environment,
    error::{ChallengeError, LeaseError},
    lease::{LeaseToken, SessionKey},
};

type Block = [u8; BLOCK_SIZE];

/// Actions returned by the challenger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeAction {
    /// Send this message to the SORC
    SendMessage(SorcMessage),

    /// SORC rejected the phone; send the lease token blob again
    SendBlob {
        /// Newest blob counter the SORC knows, if it reported one
        latest_counter: Option<u32>,
    },

    /// Handshake completed
    Finished(SessionKey),

    /// Handshake failed; no session key will be produced
    Aborted(ChallengeError),
}

/// Challenger state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengerState {
    /// Challenge not sent yet
    Idle,
    /// b0 sent, waiting for b1 and b2
    AwaitingPeerResponse,
    /// b3 queued, waiting for the transport to confirm it was sent
    AwaitingSendConfirmation,
    /// Session key released
    SessionEstablished,
    /// Handshake failed or was cancelled
    Aborted,
}

impl ChallengerState {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::SessionEstablished | Self::Aborted)
    }
}

/// Nonces and intermediate values of one handshake.
#[derive(Zeroize, ZeroizeOnDrop)]
struct HandshakeSecrets {
    nc: Block,
    b0: Block,
    nr: Option<Block>,
}

/// Phone side of the challenge-response handshake.
#[derive(Debug)]
pub struct Challenger {
    state: ChallengerState,
    cipher: AesCbc,
    template: PhoneToSorcChallenge,
    secrets: Option<HandshakeSecrets>,
    abort_reason: Option<ChallengeError>,
}

impl std::fmt::Debug for HandshakeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandshakeSecrets([REDACTED])")
    }
}

impl Challenger {
    /// Create a challenger for a lease token.
    ///
    /// Fails fast when the token's key or ids cannot be used. Draws the phone
    /// nonce from `env`.
    pub fn new(lease_token: &LeaseToken, env: &impl Environment) -> Result<Self, ChallengeError> {
        let cipher = lease_token.shared_key()?.cipher();
        let template = PhoneToSorcChallenge {
            lease_id: lease_token.lease_id.clone(),
            sorc_id: lease_token.sorc_id,
            lease_token_id: lease_token.id.clone(),
            challenge: [0; BLOCK_SIZE],
        };
        template.encode().map_err(invalid_id)?;

        let mut nc = [0u8; BLOCK_SIZE];
        env.random_bytes(&mut nc);

        Ok(Self {
            state: ChallengerState::Idle,
            cipher,
            template,
            secrets: Some(HandshakeSecrets { nc, b0: [0; BLOCK_SIZE], nr: None }),
            abort_reason: None,
        })
    }

    /// Current state
    pub fn state(&self) -> ChallengerState {
        self.state
    }

    /// Why the handshake was aborted, if it was.
    pub fn abort_reason(&self) -> Option<&ChallengeError> {
        self.abort_reason.as_ref()
    }

    /// Whether any nonce material is still held.
    pub fn holds_secrets(&self) -> bool {
        self.secrets.is_some()
    }

    /// Send the phone challenge b0.
    ///
    /// Allowed from `Idle` and, to restart after the SORC acknowledged a blob,
    /// from `AwaitingPeerResponse`.
    pub fn begin(&mut self) -> Result<Vec<ChallengeAction>, ChallengeError> {
        if !matches!(self.state, ChallengerState::Idle | ChallengerState::AwaitingPeerResponse) {
            return Err(self.invalid_state("begin"));
        }
        let Some(secrets) = self.secrets.as_mut() else {
            return Err(self.invalid_state("begin"));
        };

        let b0 = match self.cipher.encrypt_block(&secrets.nc) {
            Ok(b0) => b0,
            Err(_) => return Ok(self.abort(ChallengeError::EncryptionFailed)),
        };
        secrets.b0 = b0;

        let mut payload = self.template.clone();
        payload.challenge = b0;
        let payload = payload.encode().map_err(invalid_id)?;

        self.state = ChallengerState::AwaitingPeerResponse;
        debug!(sorc_id = %self.template.sorc_id, "challenge sent");

        Ok(vec![ChallengeAction::SendMessage(SorcMessage::new(
            SorcMessageId::ChallengePhone,
            payload,
        ))])
    }

    /// Handle a handshake message received from the SORC.
    pub fn handle_received(
        &mut self,
        message: &SorcMessage,
    ) -> Result<Vec<ChallengeAction>, ChallengeError> {
        if self.state.is_terminal() {
            return Err(self.invalid_state("handle_received"));
        }

        match message.id {
            SorcMessageId::LtAck => {
                debug!("lease token blob acknowledged");
                self.begin()
            },
            SorcMessageId::BadChallengeSorcResponse => {
                let latest_counter = BlobRequest::decode(&message.payload).blob_message_counter;
                debug!(?latest_counter, "SORC rejected challenge, blob requested");
                self.state = ChallengerState::Idle;
                Ok(vec![ChallengeAction::SendBlob { latest_counter }])
            },
            SorcMessageId::ChallengeSorcResponse => {
                if self.state != ChallengerState::AwaitingPeerResponse {
                    return Err(self.invalid_state("handle_received(ChallengeSorcResponse)"));
                }
                Ok(self.continue_challenge(&SorcToPhoneResponse::decode(&message.payload)))
            },
            other => {
                warn!(id = ?other, "unexpected message during handshake");
                Ok(self.abort(ChallengeError::NoChallengeMessage))
            },
        }
    }

    /// Handle confirmation that a message left the transport.
    ///
    /// Releases the session key once `ChallengePhoneResponse` is confirmed.
    /// Every other message is ignored.
    pub fn handle_sent(&mut self, message: &SorcMessage) -> Vec<ChallengeAction> {
        if message.id != SorcMessageId::ChallengePhoneResponse
            || self.state != ChallengerState::AwaitingSendConfirmation
        {
            return Vec::new();
        }

        let Some(key) = self.secrets.as_ref().and_then(derive_session_key) else {
            return self.abort(ChallengeError::ResponseIsCorrupt);
        };

        self.state = ChallengerState::SessionEstablished;
        self.secrets = None;
        debug!(key_len = key.as_bytes().len(), "handshake finished");

        vec![ChallengeAction::Finished(key)]
    }

    /// Abort a running handshake.
    pub fn cancel(&mut self) -> Vec<ChallengeAction> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.abort(ChallengeError::Cancelled)
    }

    fn continue_challenge(&mut self, response: &SorcToPhoneResponse) -> Vec<ChallengeAction> {
        let (Ok(b1), Ok(b2)) =
            (Block::try_from(response.b1.as_slice()), Block::try_from(response.b2.as_slice()))
        else {
            warn!("challenge response is corrupt");
            return self.abort(ChallengeError::ResponseIsCorrupt);
        };
        let Some(secrets) = self.secrets.as_mut() else {
            return self.abort(ChallengeError::ResponseIsCorrupt);
        };

        let Ok(decrypted_b2) = self.cipher.decrypt_block(&b2) else {
            return self.abort(ChallengeError::DecryptionFailed);
        };
        let mut r3 = xor(&decrypted_b2, &b1);
        let matches = rotate(&r3, true) == secrets.nc;
        r3.zeroize();
        if !matches {
            warn!("challenge response does not match");
            let mut actions = vec![ChallengeAction::SendMessage(SorcMessage::empty(
                SorcMessageId::BadChallengePhoneResponse,
            ))];
            actions.extend(self.abort(ChallengeError::ResponseDoesNotMatch));
            return actions;
        }

        let Ok(decrypted_b1) = self.cipher.decrypt_block(&b1) else {
            return self.abort(ChallengeError::DecryptionFailed);
        };
        let nr = xor(&decrypted_b1, &secrets.b0);
        let mut r5 = rotate(&nr, false);
        secrets.nr = Some(nr);

        let b3 = self.cipher.encrypt_block(&xor(&r5, &b2));
        r5.zeroize();
        let Ok(b3) = b3 else {
            return self.abort(ChallengeError::EncryptionFailed);
        };

        self.state = ChallengerState::AwaitingSendConfirmation;
        debug!("SORC verified, sending phone response");

        vec![ChallengeAction::SendMessage(SorcMessage::new(
            SorcMessageId::ChallengePhoneResponse,
            PhoneToSorcResponse { response: b3 }.encode(),
        ))]
    }

    fn abort(&mut self, error: ChallengeError) -> Vec<ChallengeAction> {
        self.state = ChallengerState::Aborted;
        self.secrets = None;
        self.abort_reason = Some(error.clone());
        vec![ChallengeAction::Aborted(error)]
    }

    fn invalid_state(&self, operation: &'static str) -> ChallengeError {
        ChallengeError::InvalidState { state: self.state, operation }
    }
}

fn invalid_id(error: ProtocolError) -> ChallengeError {
    match error {
        ProtocolError::FieldTooLong { field, len, .. } => LeaseError::IdTooLong { field, len }.into(),
        _ => ChallengeError::EncryptionFailed,
    }
}

fn derive_session_key(secrets: &HandshakeSecrets) -> Option<SessionKey> {
    let nr = secrets.nr.as_ref()?;
    let nc = &secrets.nc;
    let mut key = [0u8; BLOCK_SIZE];
    key[0..4].copy_from_slice(&nr[0..4]);
    key[4..8].copy_from_slice(&nc[0..4]);
    key[8..12].copy_from_slice(&nr[12..16]);
    key[12..16].copy_from_slice(&nc[12..16]);
    let session_key = SessionKey::new(key);
    key.zeroize();
    Some(session_key)
}

/// Byte permutation used by the handshake.
///
/// Forward moves the last byte to the front; inverse moves the first byte to
/// the end.
pub fn rotate<const N: usize>(bytes: &[u8; N], inverse: bool) -> [u8; N] {
    let mut out = *bytes;
    if inverse {
        out.rotate_left(1);
    } else {
        out.rotate_right(1);
    }
    out
}

fn xor(a: &Block, b: &Block) -> Block {
    std::array::from_fn(|i| a[i] ^ b[i])
}
