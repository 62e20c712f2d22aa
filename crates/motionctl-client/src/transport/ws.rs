//! WebSocket transport for both supervisor channels.
//!
//! Command channel: every binary or text message is one encoded envelope in
//! each direction. Event channel: every data message is one frame of the
//! `[topic, payload, …]` sequence, forwarded to the hub in arrival order.
//! Neither channel reconnects; a dropped socket is reported as
//! [`TransportEvent::Closed`] and the task ends.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Transport, TransportError, TransportEvent};
use crate::hub::NotificationHub;

/// Outbound handle of a connected command channel.
pub struct WsTransport {
    tx: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// Payload of a data message, `None` for control messages.
fn data_frame(message: Message) -> Option<Bytes> {
    match message {
        Message::Binary(data) => Some(Bytes::copy_from_slice(&data)),
        Message::Text(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

/// Connect the command channel.
///
/// Returns the outbound handle and the event stream to hand to
/// [`ConnectionSupervisor::attach`](crate::ConnectionSupervisor::attach). The
/// stream starts with [`TransportEvent::Opened`] and ends with
/// [`TransportEvent::Closed`].
pub async fn connect_command(
    url: &str,
) -> Result<(Arc<WsTransport>, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
    let (ws, _) = connect_async(url).await?;
    info!(url, "command channel connected");
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let _ = event_tx.send(TransportEvent::Opened);

    let _writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::binary(frame)).await {
                warn!(error = %e, "command channel write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let url = url.to_owned();
    let _reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "command channel close frame");
                    break;
                }
                Ok(message) => {
                    if let Some(frame) = data_frame(message) {
                        if event_tx.send(TransportEvent::Message(frame)).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "command channel read failed");
                    break;
                }
            }
        }
        info!(url, "command channel closed");
        let _ = event_tx.send(TransportEvent::Closed);
    });

    Ok((Arc::new(WsTransport { tx: out_tx }), event_rx))
}

/// Connect the event channel and feed every frame into `hub`.
///
/// The returned task ends when the socket closes.
pub async fn connect_events(
    url: &str,
    hub: Arc<NotificationHub>,
) -> Result<JoinHandle<()>, TransportError> {
    let (ws, _) = connect_async(url).await?;
    info!(url, "event channel connected");
    let (_sink, mut stream) = ws.split();
    hub.reset_pairing();

    let url = url.to_owned();
    Ok(tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(message) => {
                    if let Some(frame) = data_frame(message) {
                        hub.ingest(frame);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "event channel read failed");
                    break;
                }
            }
        }
        info!(url, "event channel closed");
    }))
}
