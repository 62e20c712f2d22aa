//! Periodic heartbeat while the connection is open.

use std::sync::Arc;
use std::time::Duration;

use motionctl_core::Request;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::correlator::Correlator;

/// Send a [`Request::Ping`] every `interval` until cancelled.
///
/// Pings are fire-and-forget: nobody observes their ids. Whatever comes back,
/// pong or otherwise, feeds liveness through the inbound path.
pub(crate) async fn run_heartbeat(
    correlator: Arc<Correlator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let id = correlator.send(Request::Ping, None);
                trace!(%id, "heartbeat ping");
            }
            () = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motionctl_core::Body;

    #[tokio::test(start_paused = true)]
    async fn pings_every_interval_after_the_first_delay() {
        let (correlator, mut queue) = Correlator::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::new(correlator),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        time::sleep(Duration::from_millis(50)).await;
        assert!(queue.try_recv().is_none());

        time::sleep(Duration::from_millis(300)).await;
        let pings: Vec<_> = std::iter::from_fn(|| queue.try_recv()).collect();
        assert_eq!(pings.len(), 3);
        assert!(pings.iter().all(|e| e.body == Body::Request(Request::Ping)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_pings() {
        let (correlator, mut queue) = Correlator::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::new(correlator),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        cancel.cancel();
        handle.await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ping_ids_are_fresh() {
        let (correlator, mut queue) = Correlator::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::new(correlator),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        time::sleep(Duration::from_millis(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        let a = queue.try_recv().unwrap();
        let b = queue.try_recv().unwrap();
        assert_ne!(a.id, b.id);
    }
}
