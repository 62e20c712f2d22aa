//! Request/response correlation.
//!
//! [`Correlator::send`] wraps a [`Request`] in an envelope and queues it for
//! the outbound pipe; it never waits for a reply. Replies are consumed through
//! [`Observation`]s, each an independent filter over inbound envelopes keyed
//! by correlation id and, optionally, status kind.
//!
//! Observations never end on their own. A command that replies in phases
//! (started, progress, done) delivers every phase on the same observation and
//! the caller decides when to stop. A request that is never answered leaves
//! its observation pending forever unless the caller applies a timeout.
//!
//! Correlation ids are not checked for uniqueness. Two in-flight requests
//! sharing an id both see the union of the matching replies.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use motionctl_core::{Body, CorrelationId, Envelope, Request, Status, StatusKind};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::registry::{Registry, SubscriptionHandle};

/// Receiving end of the outbound envelope queue, drained by the outbound pipe.
///
/// Envelopes leave in exactly the order [`Correlator::send`] was called.
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl OutboundQueue {
    /// Wait for the next queued envelope.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take the next queued envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// Builds outbound envelopes and fans inbound ones out to observations.
pub struct Correlator {
    outbound: mpsc::UnboundedSender<Envelope>,
    observers: Arc<Registry<Envelope>>,
}

impl Correlator {
    /// Create a correlator and the queue its sends land in.
    pub fn new() -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Self {
            outbound: tx,
            observers: Arc::new(Registry::new()),
        };
        (correlator, OutboundQueue { rx })
    }

    /// Queue `request` for sending and return its correlation id.
    ///
    /// Uses `id` when given, otherwise a fresh UUID v7.
    pub fn send(&self, request: Request, id: Option<CorrelationId>) -> CorrelationId {
        let id = id.unwrap_or_default();
        trace!(%id, request = ?request, "queue request");
        // The queue lives as long as the OutboundQueue handed out by `new`;
        // once that is dropped nothing can transmit anyway.
        let _ = self.outbound.send(Envelope::request(id.clone(), request));
        id
    }

    /// Observe inbound statuses.
    ///
    /// - `id`: only envelopes carrying this id; `None` sniffs all traffic.
    /// - `kind`: only statuses of this kind; `None` yields every status.
    pub fn observe(&self, id: Option<CorrelationId>, kind: Option<StatusKind>) -> Observation {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.observe_with(id, kind, move |status| {
            let _ = tx.send(status.clone());
        });
        Observation {
            handle,
            rx,
            observers: Arc::clone(&self.observers),
        }
    }

    /// Callback form of [`observe`](Self::observe).
    ///
    /// The callback runs on the task that dispatches inbound traffic and must
    /// not block.
    pub fn observe_with<F>(
        &self,
        id: Option<CorrelationId>,
        kind: Option<StatusKind>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        let filter = ObservationFilter { id, kind };
        let handle = self.observers.insert(Arc::new(move |envelope: &Envelope| {
            if let Some(status) = filter.select(envelope) {
                callback(status);
            }
        }));
        debug!(%handle, "observation registered");
        handle
    }

    /// Register an observation for a fresh id, then send `request` under it.
    ///
    /// The observation exists before the request leaves, so no reply can
    /// slip past it.
    pub fn request(&self, request: Request) -> (CorrelationId, Observation) {
        let id = CorrelationId::new();
        let observation = self.observe(Some(id.clone()), None);
        let _ = self.send(request, Some(id.clone()));
        (id, observation)
    }

    /// Cancel an observation by handle. Unknown handles are ignored.
    pub fn unobserve(&self, handle: SubscriptionHandle) {
        if self.observers.remove(handle) {
            debug!(%handle, "observation cancelled");
        }
    }

    /// Deliver one inbound envelope to every matching observation.
    pub fn dispatch(&self, envelope: &Envelope) {
        let delivered = self.observers.publish(envelope);
        trace!(id = %envelope.id, observers = delivered, "dispatched inbound envelope");
    }

    /// Number of live observations.
    pub fn observation_count(&self) -> usize {
        self.observers.len()
    }
}

#[derive(Clone, Debug)]
struct ObservationFilter {
    id: Option<CorrelationId>,
    kind: Option<StatusKind>,
}

impl ObservationFilter {
    fn select<'a>(&self, envelope: &'a Envelope) -> Option<&'a Status> {
        if self.id.as_ref().is_some_and(|id| *id != envelope.id) {
            return None;
        }
        let Body::Status(status) = &envelope.body else {
            return None;
        };
        match self.kind {
            Some(kind) if status.kind() != kind => None,
            _ => Some(status),
        }
    }
}

/// A live, unbounded stream of statuses matching one filter.
///
/// Cancelled explicitly with [`cancel`](Self::cancel), or when dropped.
pub struct Observation {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<Status>,
    observers: Arc<Registry<Envelope>>,
}

impl Observation {
    /// Handle of the underlying registration.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next matching status.
    pub async fn recv(&mut self) -> Option<Status> {
        self.rx.recv().await
    }

    /// Stop observing. Statuses not yet read are discarded.
    pub fn cancel(self) {
        drop(self);
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Stream for Observation {
    type Item = Status;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        let _ = self.observers.remove(self.handle);
    }
}
