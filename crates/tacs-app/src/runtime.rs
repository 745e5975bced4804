//! Generic runtime driving one session over a transport.
//!
//! The runtime is the single writer for all session state: it owns the
//! [`Session`], the [`Dispatcher`] and the transport, and processes commands
//! and transport events one at a time on one task. Feature managers and other
//! callers talk to it through a [`ServiceGrantRequester`].

use tacs_core::{
    Environment,
    lease::{LeaseToken, LeaseTokenBlob},
    service_grant::ServiceGrantChange,
    session::{Session, SessionAction, SessionState},
    transport::{Transport, TransportEvent},
};
use tacs_proto::ServiceGrantId;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{ChangeSubject, Dispatcher, RuntimeError, SubjectConfig};

/// Commands accepted by the runtime.
#[derive(Debug, Clone)]
pub enum RuntimeCommand {
    /// Connect to the lease token's SORC
    Connect {
        /// Lease token with the pre-shared key
        lease_token: Box<LeaseToken>,
        /// Blob forwarded to the SORC
        blob: LeaseTokenBlob,
    },
    /// Send a service grant request
    RequestServiceGrant(ServiceGrantId),
    /// Send a keep-alive
    Heartbeat,
    /// Drop the link
    Disconnect,
    /// Stop the runtime
    Shutdown,
}

/// Cloneable handle for sending commands to a runtime.
#[derive(Debug, Clone)]
pub struct ServiceGrantRequester {
    tx: mpsc::UnboundedSender<RuntimeCommand>,
}

impl ServiceGrantRequester {
    /// Create a handle and the receiver the runtime reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RuntimeCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a service grant request. Returns `false` if the runtime is gone.
    pub fn request(&self, id: ServiceGrantId) -> bool {
        self.send(RuntimeCommand::RequestServiceGrant(id))
    }

    /// Queue any command. Returns `false` if the runtime is gone.
    pub fn send(&self, command: RuntimeCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Orchestration loop for one SORC session.
pub struct Runtime<T: Transport, E: Environment> {
    transport: T,
    session: Session<E>,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<RuntimeCommand>,
    states: ChangeSubject<SessionState>,
}

impl<T: Transport, E: Environment> Runtime<T, E> {
    /// Create a runtime.
    pub fn new(
        transport: T,
        session: Session<E>,
        dispatcher: Dispatcher,
        commands: mpsc::UnboundedReceiver<RuntimeCommand>,
    ) -> Self {
        let states = ChangeSubject::new(session.state(), SubjectConfig::default());
        Self { transport, session, dispatcher, commands, states }
    }

    /// Session state stream; the first value is the current state.
    pub fn subscribe_state(&self) -> (SessionState, broadcast::Receiver<SessionState>) {
        self.states.subscribe()
    }

    /// The session being driven.
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Run until shutdown, until every command sender is gone, or until the
    /// transport closes.
    ///
    /// `Transport::next_event` must be cancel safe.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        info!("runtime started");
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("all command senders dropped");
                        break;
                    };
                    if matches!(command, RuntimeCommand::Shutdown) {
                        break;
                    }
                    self.handle_command(command).await?;
                }
                event = self.transport.next_event() => {
                    let Some(event) = event else {
                        debug!("transport closed");
                        break;
                    };
                    self.handle_event(event).await?;
                }
            }
        }

        let actions = self.session.disconnect();
        self.execute(actions).await?;
        info!("runtime stopped");
        Ok(())
    }

    /// Process one command.
    pub async fn handle_command(&mut self, command: RuntimeCommand) -> Result<(), RuntimeError> {
        let result = match command {
            RuntimeCommand::Connect { lease_token, blob } => {
                self.session.connect(&lease_token, blob)
            },
            RuntimeCommand::RequestServiceGrant(id) => self.session.request_service_grant(id),
            RuntimeCommand::Heartbeat => self.session.heartbeat(),
            RuntimeCommand::Disconnect => Ok(self.session.disconnect()),
            RuntimeCommand::Shutdown => Ok(Vec::new()),
        };
        match result {
            Ok(actions) => self.execute(actions).await,
            Err(err) => {
                warn!(error = %err, "command rejected");
                Ok(())
            },
        }
    }

    /// Process one transport event.
    pub async fn handle_event(&mut self, event: TransportEvent) -> Result<(), RuntimeError> {
        match self.session.handle_event(event) {
            Ok(actions) => self.execute(actions).await,
            Err(err) => {
                warn!(error = %err, "inbound data dropped");
                Ok(())
            },
        }
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), RuntimeError> {
        for action in actions {
            match action {
                SessionAction::Connect(sorc_id) => self.transport.connect(sorc_id).await?,
                SessionAction::Disconnect => self.transport.disconnect().await?,
                SessionAction::Send(bytes) => self.transport.send(bytes).await?,
                SessionAction::StateChanged(state) => {
                    debug!(?state, "session state");
                    self.states.publish(state);
                },
                SessionAction::ServiceGrantChanged(change) => self.dispatch(change),
                SessionAction::Failed(err) => error!(error = %err, "session failed"),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, change: ServiceGrantChange) {
        if let Some(unclaimed) = self.dispatcher.dispatch(change) {
            debug!(id = ?unclaimed.service_grant_id(), "service grant change dropped");
        }
    }
}
