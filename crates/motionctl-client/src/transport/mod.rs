//! Transport seam between the supervisor and the sockets.
//!
//! The supervisor only needs to push encoded frames out ([`Transport`]) and
//! to be told about lifecycle changes and inbound frames
//! ([`TransportEvent`]). Delivery guarantees, framing and reconnection belong
//! to the implementation; [`ws`] provides one over WebSockets.

pub mod ws;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport failures. Never surfaced per request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket layer failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    /// The transport has shut down.
    #[error("transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Lifecycle signals and inbound frames pushed by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is usable.
    Opened,
    /// The channel went away.
    Closed,
    /// One inbound frame (one encoded envelope on the command channel).
    Message(Bytes),
}

/// Outbound half of a command channel.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queue one frame for delivery.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;
}
