//! Connection supervision for the command channel.
//!
//! [`ConnectionSupervisor`] owns the [`Correlator`] and wires it to a
//! [`Transport`]:
//!
//! - **Outbound pipe**: drains the correlator's queue, encodes, sends. Only
//!   runs while the connection is open; envelopes sent while closed wait in
//!   the queue and leave in order on the next open.
//! - **Inbound path**: [`handle_inbound`](ConnectionSupervisor::handle_inbound)
//!   decodes a frame, feeds liveness, drops pongs, dispatches the rest.
//! - **Heartbeat**: a ping every `ping_delay` while open.
//! - **Liveness**: `alive` drops to `false` after `alive_timeout` of inbound
//!   silence and comes back on the next envelope.
//!
//! Closing, whether by [`close`](ConnectionSupervisor::close) or a transport
//! [`TransportEvent::Closed`], stops the pipes and both timers together.

mod heartbeat;
mod liveness;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use motionctl_core::{Codec, CodecError};
use motionctl_settings::ConnectionSettings;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::correlator::{Correlator, OutboundQueue};
use crate::transport::{Transport, TransportEvent};
use liveness::Liveness;

/// Heartbeat and liveness timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Interval between heartbeat pings.
    pub ping_delay: Duration,
    /// Inbound silence after which the peer counts as dead.
    pub alive_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ping_delay: Duration::from_millis(1000),
            alive_timeout: Duration::from_millis(3000),
        }
    }
}

impl From<&ConnectionSettings> for SupervisorConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            ping_delay: settings.ping_delay(),
            alive_timeout: settings.alive_timeout(),
        }
    }
}

/// Whether the pipes are wired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing flows; sends accumulate in the queue.
    Closed,
    /// Pipes and timers running.
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// Cancellation scopes of one open period.
struct Session {
    pipes: CancellationToken,
    timers: CancellationToken,
}

impl Session {
    fn cancel(&self) {
        self.pipes.cancel();
        self.timers.cancel();
    }
}

/// Wires a [`Correlator`] to a transport and tracks peer liveness.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
    outbound: Arc<tokio::sync::Mutex<OutboundQueue>>,
    liveness: Arc<Liveness>,
    session: Mutex<Option<Session>>,
}

impl ConnectionSupervisor {
    /// Create a closed supervisor. Nothing is sent until [`open`](Self::open).
    pub fn new(
        config: SupervisorConfig,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (correlator, queue) = Correlator::new();
        Self {
            config,
            codec,
            transport,
            correlator: Arc::new(correlator),
            outbound: Arc::new(tokio::sync::Mutex::new(queue)),
            liveness: Arc::new(Liveness::new()),
            session: Mutex::new(None),
        }
    }

    /// The correlator requests go through.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.session.lock().is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Watch the liveness flag. Starts `true`.
    pub fn alive(&self) -> watch::Receiver<bool> {
        self.liveness.subscribe()
    }

    /// Current liveness.
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Wire the pipes and start the heartbeat and liveness timers.
    ///
    /// Opening an open supervisor restarts everything. Must be called from
    /// within a Tokio runtime.
    pub fn open(&self) {
        let session = Session {
            pipes: CancellationToken::new(),
            timers: CancellationToken::new(),
        };

        drop(tokio::spawn(run_outbound(
            Arc::clone(&self.outbound),
            Arc::clone(&self.codec),
            Arc::clone(&self.transport),
            session.pipes.clone(),
        )));
        drop(tokio::spawn(heartbeat::run_heartbeat(
            Arc::clone(&self.correlator),
            self.config.ping_delay,
            session.timers.clone(),
        )));
        drop(tokio::spawn(liveness::run_watchdog(
            Arc::clone(&self.liveness),
            self.config.alive_timeout,
            session.timers.clone(),
        )));

        if let Some(previous) = self.session.lock().replace(session) {
            debug!("reopening, previous session cancelled");
            previous.cancel();
        }
        info!(
            ping_delay_ms = self.config.ping_delay.as_millis(),
            alive_timeout_ms = self.config.alive_timeout.as_millis(),
            "connection open"
        );
    }

    /// Stop the pipes and timers. Closing a closed supervisor is a no-op.
    pub fn close(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel();
            info!("connection closed");
        }
    }

    /// Feed one inbound frame.
    ///
    /// Ignored while closed. Any decoded envelope counts as traffic for
    /// liveness; pongs stop there, everything else goes to the correlator.
    #[instrument(skip_all, fields(len = frame.len()))]
    pub fn handle_inbound(&self, frame: &[u8]) -> Result<(), CodecError> {
        if self.session.lock().is_none() {
            trace!("inbound frame while closed, ignored");
            return Ok(());
        }
        let envelope = self.codec.decode(frame)?;
        self.liveness.record_traffic();
        if envelope.is_pong() {
            trace!(id = %envelope.id, "pong");
            return Ok(());
        }
        self.correlator.dispatch(&envelope);
        Ok(())
    }

    /// Drive the supervisor from a transport's event stream.
    ///
    /// Decode failures are logged and the frame is skipped. The stream
    /// ending counts as [`TransportEvent::Closed`].
    pub fn attach(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Opened => supervisor.open(),
                    TransportEvent::Closed => supervisor.close(),
                    TransportEvent::Message(frame) => {
                        if let Err(err) = supervisor.handle_inbound(&frame) {
                            warn!(error = %err, len = frame.len(), "dropping undecodable frame");
                        }
                    }
                }
            }
            debug!("transport event stream ended");
            supervisor.close();
        })
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel();
        }
    }
}

/// Drain the outbound queue into the transport until cancelled.
///
/// A send already handed to the transport is allowed to finish.
async fn run_outbound(
    queue: Arc<tokio::sync::Mutex<OutboundQueue>>,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) {
    // A previous pipe may still hold the queue until it notices its own
    // cancellation.
    let mut queue = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        guard = queue.lock() => guard,
    };

    loop {
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = queue.recv() => match next {
                Some(envelope) => envelope,
                None => return,
            },
        };
        let frame = match codec.encode(&envelope) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(id = %envelope.id, error = %err, "failed to encode outbound envelope");
                continue;
            }
        };
        if let Err(err) = transport.send(frame).await {
            warn!(id = %envelope.id, error = %err, "failed to send outbound envelope");
        }
    }
}
