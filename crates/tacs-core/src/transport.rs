//! Transport abstraction for the SORC link.
//!
//! The link is a connection-oriented, message-preserving byte pipe with a
//! small MTU (a BLE characteristic in production). Each `send` is one
//! transport write of at most one data frame; the transport reports back when
//! the write has gone out so the session can release the next frame.
//!
//! Scanning, pairing and radio retries live below this trait.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tacs_proto::SorcId;

/// Link state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link
    Disconnected,
    /// Link being established
    Connecting,
    /// Link up, bytes can flow
    Connected,
}

/// Events delivered by the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link state changed
    LinkStateChanged(LinkState),
    /// One transport write from the peer (one encoded data frame)
    BytesReceived(Bytes),
    /// The last `send` completed
    DataSent,
}

/// Abstract transport to one SORC.
///
/// Implementations must deliver events in order and without duplicates.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Start connecting to a SORC.
    ///
    /// Completion is reported through [`TransportEvent::LinkStateChanged`].
    async fn connect(&mut self, sorc_id: SorcId) -> io::Result<()>;

    /// Drop the link.
    async fn disconnect(&mut self) -> io::Result<()>;

    /// Write one frame.
    ///
    /// Completion is reported through [`TransportEvent::DataSent`].
    async fn send(&mut self, data: Bytes) -> io::Result<()>;

    /// Next event, or `None` once the transport is closed for good.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}
