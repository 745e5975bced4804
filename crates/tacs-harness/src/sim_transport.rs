//! In-memory transport wired to a [`SimSorc`].
//!
//! Every `send` is handed straight to the simulated SORC; its reply frames
//! are queued as [`TransportEvent::BytesReceived`] right after the
//! [`TransportEvent::DataSent`] for the write. Events flow through a tokio
//! channel so the transport can be driven by an async runtime.

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tacs_core::{
    SessionError,
    transport::{LinkState, Transport, TransportEvent},
};
use tacs_proto::{SorcId, payloads::ServiceGrantTrigger};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::SimSorc;

#[derive(Debug)]
struct Link {
    sorc: SimSorc,
    connected: bool,
    frames_sent: usize,
    frames_received: usize,
}

/// Test-side handle to a [`SimTransport`].
///
/// Lets a test inspect the simulated SORC and inject events while a runtime
/// owns the transport.
#[derive(Debug, Clone)]
pub struct SimTransportHandle {
    link: Arc<Mutex<Link>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SimTransportHandle {
    /// Run a closure against the simulated SORC.
    pub fn with_sorc<R>(&self, f: impl FnOnce(&SimSorc) -> R) -> R {
        f(&self.link.lock().sorc)
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.link.lock().connected
    }

    /// Frames written by the phone.
    pub fn frames_sent(&self) -> usize {
        self.link.lock().frames_sent
    }

    /// Frames delivered to the phone.
    pub fn frames_received(&self) -> usize {
        self.link.lock().frames_received
    }

    /// Have the SORC push a service grant trigger.
    pub fn push_trigger(&self, trigger: &ServiceGrantTrigger) -> Result<(), SessionError> {
        let mut link = self.link.lock();
        let frames = link.sorc.trigger(trigger)?;
        link.frames_received += frames.len();
        for frame in frames {
            let _ = self.events.send(TransportEvent::BytesReceived(frame));
        }
        Ok(())
    }

    /// Drop the link from the SORC side.
    pub fn drop_link(&self) {
        let mut link = self.link.lock();
        if link.connected {
            link.connected = false;
            link.sorc.link_down();
            let _ = self.events.send(TransportEvent::LinkStateChanged(LinkState::Disconnected));
        }
    }
}

/// Simulated transport to one SORC.
#[derive(Debug)]
pub struct SimTransport {
    handle: SimTransportHandle,
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SimTransport {
    /// Transport in front of `sorc`.
    pub fn new(sorc: SimSorc) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let link = Link { sorc, connected: false, frames_sent: 0, frames_received: 0 };
        Self { handle: SimTransportHandle { link: Arc::new(Mutex::new(link)), events }, receiver }
    }

    /// Handle for inspection and injection.
    pub fn handle(&self) -> SimTransportHandle {
        self.handle.clone()
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver lives in `self`, so the channel cannot be closed here.
        let _ = self.handle.events.send(event);
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(&mut self, sorc_id: SorcId) -> io::Result<()> {
        let mut link = self.handle.link.lock();
        if link.sorc.sorc_id() != sorc_id {
            warn!(%sorc_id, "no such SORC in range");
            drop(link);
            self.emit(TransportEvent::LinkStateChanged(LinkState::Disconnected));
            return Ok(());
        }
        link.connected = true;
        drop(link);
        debug!(%sorc_id, "simulated link up");
        self.emit(TransportEvent::LinkStateChanged(LinkState::Connecting));
        self.emit(TransportEvent::LinkStateChanged(LinkState::Connected));
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        let mut link = self.handle.link.lock();
        if !link.connected {
            return Ok(());
        }
        link.connected = false;
        link.sorc.link_down();
        drop(link);
        self.emit(TransportEvent::LinkStateChanged(LinkState::Disconnected));
        Ok(())
    }

    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        let mut link = self.handle.link.lock();
        if !link.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "simulated link is down"));
        }
        link.frames_sent += 1;
        let replies = match link.sorc.receive_frame(&data) {
            Ok(replies) => replies,
            Err(error) => {
                warn!(%error, "SORC dropped frame");
                Vec::new()
            },
        };
        link.frames_received += replies.len();
        drop(link);

        self.emit(TransportEvent::DataSent);
        for reply in replies {
            self.emit(TransportEvent::BytesReceived(reply));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }
}
