//! Liveness inferred from inbound traffic.
//!
//! Any inbound envelope marks the peer alive at once and restarts the
//! deadline. When the deadline passes with no traffic the flag drops to
//! `false`, once; it stays there until the next envelope arrives.

use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// Shared liveness flag of one supervisor.
pub(crate) struct Liveness {
    alive: watch::Sender<bool>,
    traffic: Notify,
}

impl Liveness {
    /// Start out alive.
    pub(crate) fn new() -> Self {
        let (alive, _) = watch::channel(true);
        Self {
            alive,
            traffic: Notify::new(),
        }
    }

    /// Record inbound traffic.
    pub(crate) fn record_traffic(&self) {
        let revived = self.alive.send_if_modified(|alive| !std::mem::replace(alive, true));
        if revived {
            info!("peer alive again");
        }
        self.traffic.notify_one();
    }

    /// Current flag.
    pub(crate) fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Watch the flag; only real transitions wake the receiver.
    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }

    fn expire(&self) -> bool {
        self.alive.send_if_modified(|alive| std::mem::replace(alive, false))
    }
}

/// Drop the flag after `timeout` of silence. Runs until cancelled.
pub(crate) async fn run_watchdog(
    liveness: std::sync::Arc<Liveness>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    // Disarmed after firing so expiry is reported once per silence.
    let mut armed = true;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = liveness.traffic.notified() => {
                trace!("liveness deadline reset");
                armed = true;
            }
            () = time::sleep(timeout), if armed => {
                armed = false;
                if liveness.expire() {
                    info!(timeout_ms = timeout.as_millis(), "peer silent, marking dead");
                }
            }
        }
    }
}
