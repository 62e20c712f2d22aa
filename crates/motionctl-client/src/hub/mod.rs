//! Topic demultiplexing of the notification channel.
//!
//! Raw frames enter through [`NotificationHub::ingest`], are paired
//! positionally into notifications ([`pairing`]) and routed to every
//! subscription whose topic matches. The payload is decoded once, then per
//! subscription optionally deduplicated against the last delivered payload
//! ([`distinct`]) and accumulated until `buffer_size` payloads are held; the
//! full batch is then delivered as one unit and the accumulator cleared.
//!
//! A decode or comparison failure is delivered to each affected subscription
//! as an `Err` and ends it. Subscriptions on other topics are untouched.

pub mod distinct;
pub mod pairing;

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use motionctl_core::{Codec, CodecError, ParameterSet};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::registry::{HandleSeq, SubscriptionHandle};
use pairing::{FramePairing, Notification};

/// Errors raised by topic subscriptions.
#[derive(Debug, Error)]
pub enum HubError {
    /// Deduplication met payloads whose parameter arrays cannot be compared.
    #[error("cannot compare parameter sets of {previous} and {next} values")]
    MalformedComparison {
        /// Length of the previously delivered payload's values.
        previous: usize,
        /// Length of the incoming payload's values.
        next: usize,
    },
    /// A subscription asked for batches of zero.
    #[error("buffer size must be at least 1")]
    InvalidBufferSize,
    /// A payload frame could not be decoded. Shared by every subscription
    /// the notification was routed to.
    #[error(transparent)]
    Decode(Arc<CodecError>),
}

/// One delivery: a full batch, or the error that ended the subscription.
pub type Batch = Result<Vec<ParameterSet>, HubError>;

/// Callback receiving deliveries for one subscription.
pub type BatchCallback = Arc<dyn Fn(Batch) + Send + Sync>;

/// Per-subscription delivery options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Payloads per delivered batch; at least 1.
    pub buffer_size: usize,
    /// Suppress a payload equal to the previously delivered one.
    pub distinct: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            distinct: false,
        }
    }
}

struct TopicEntry {
    topic: String,
    options: SubscribeOptions,
    last_delivered: Option<ParameterSet>,
    accumulator: Vec<ParameterSet>,
    sink: BatchCallback,
}

impl TopicEntry {
    /// Run one payload through dedup and batching.
    fn accept(&mut self, payload: ParameterSet) -> Result<Option<Vec<ParameterSet>>, HubError> {
        if self.options.distinct {
            if let Some(previous) = &self.last_delivered {
                if distinct::same_values(previous, &payload)? {
                    trace!(topic = %self.topic, "suppressed duplicate payload");
                    return Ok(None);
                }
            }
            self.last_delivered = Some(payload.clone());
        }
        self.accumulator.push(payload);
        if self.accumulator.len() == self.options.buffer_size {
            return Ok(Some(mem::take(&mut self.accumulator)));
        }
        Ok(None)
    }
}

type Table = Mutex<BTreeMap<SubscriptionHandle, TopicEntry>>;

/// Demultiplexes the notification channel into topic subscriptions.
///
/// `ingest` is expected to be driven by a single task, the one reading the
/// event channel.
pub struct NotificationHub {
    codec: Arc<dyn Codec>,
    pairing: Mutex<FramePairing>,
    handles: HandleSeq,
    table: Arc<Table>,
}

impl NotificationHub {
    /// Create a hub decoding payloads with `codec`.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            pairing: Mutex::new(FramePairing::new()),
            handles: HandleSeq::default(),
            table: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Feed one raw frame from the event channel.
    pub fn ingest(&self, frame: Bytes) {
        let notification = self.pairing.lock().push(frame);
        if let Some(notification) = notification {
            self.route(&notification);
        }
    }

    /// Restart pairing at a topic frame.
    pub fn reset_pairing(&self) {
        self.pairing.lock().reset();
    }

    fn route(&self, notification: &Notification) {
        let mut deliveries: Vec<(SubscriptionHandle, BatchCallback, Batch)> = Vec::new();
        {
            let mut table = self.table.lock();
            let mut decoded: Option<Result<ParameterSet, Arc<CodecError>>> = None;
            let mut failed = Vec::new();
            for (handle, entry) in table.iter_mut() {
                if !notification.is_topic(&entry.topic) {
                    continue;
                }
                // Decoded once, on the first matching subscription.
                let payload = decoded.get_or_insert_with(|| {
                    self.codec
                        .decode_parameters(&notification.payload)
                        .map_err(Arc::new)
                });
                let outcome = match payload {
                    Ok(set) => entry.accept(set.clone()),
                    Err(err) => Err(HubError::Decode(Arc::clone(err))),
                };
                match outcome {
                    Ok(Some(batch)) => {
                        deliveries.push((*handle, Arc::clone(&entry.sink), Ok(batch)));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%handle, topic = %entry.topic, error = %err, "subscription failed");
                        deliveries.push((*handle, Arc::clone(&entry.sink), Err(err)));
                        failed.push(*handle);
                    }
                }
            }
            for handle in failed {
                let _ = table.remove(&handle);
            }
        }
        trace!(
            topic = %notification.topic_str(),
            deliveries = deliveries.len(),
            "routed notification"
        );
        for (handle, sink, batch) in deliveries {
            // An earlier callback may have unsubscribed this handle.
            if batch.is_ok() && !self.table.lock().contains_key(&handle) {
                continue;
            }
            sink(batch);
        }
    }

    /// Register a callback for batches on `topic`.
    pub fn subscribe_with<F>(
        &self,
        topic: impl Into<String>,
        options: SubscribeOptions,
        callback: F,
    ) -> Result<SubscriptionHandle, HubError>
    where
        F: Fn(Batch) + Send + Sync + 'static,
    {
        if options.buffer_size == 0 {
            return Err(HubError::InvalidBufferSize);
        }
        let topic = topic.into();
        let handle = self.handles.next();
        debug!(
            %handle,
            %topic,
            buffer_size = options.buffer_size,
            distinct = options.distinct,
            "topic subscribed"
        );
        let _ = self.table.lock().insert(
            handle,
            TopicEntry {
                topic,
                options,
                last_delivered: None,
                accumulator: Vec::new(),
                sink: Arc::new(callback),
            },
        );
        Ok(handle)
    }

    /// Subscribe to `topic` and receive batches as a stream.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        options: SubscribeOptions,
    ) -> Result<TopicSubscription, HubError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe_with(topic, options, move |batch| {
            let _ = tx.send(batch);
        })?;
        Ok(TopicSubscription {
            handle,
            rx,
            table: Arc::clone(&self.table),
        })
    }

    /// Stop delivery for `handle`, discarding any partial batch.
    ///
    /// Unknown or already removed handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(entry) = self.table.lock().remove(&handle) {
            debug!(
                %handle,
                topic = %entry.topic,
                discarded = entry.accumulator.len(),
                "topic unsubscribed"
            );
        }
    }

    /// Unsubscribe every active handle.
    pub fn unsubscribe_all(&self) {
        let removed = mem::take(&mut *self.table.lock());
        if !removed.is_empty() {
            debug!(count = removed.len(), "all topics unsubscribed");
        }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no subscription is active.
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

/// Stream of batches for one topic subscription.
///
/// Ends after delivering an error. Unsubscribes when dropped.
pub struct TopicSubscription {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<Batch>,
    table: Arc<Table>,
}

impl TopicSubscription {
    /// Handle accepted by [`NotificationHub::unsubscribe`].
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next batch.
    pub async fn recv(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }

    /// Take a batch without waiting, if one is ready.
    pub fn try_recv(&mut self) -> Option<Batch> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Stream for TopicSubscription {
    type Item = Batch;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        let _ = self.table.lock().remove(&self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use motionctl_core::{JsonCodec, ParameterValue};

    fn hub() -> NotificationHub {
        NotificationHub::new(Arc::new(JsonCodec))
    }

    fn payload(speed: i64) -> ParameterSet {
        ParameterSet::new(vec![ParameterValue::int("speed", speed)])
    }

    fn publish(hub: &NotificationHub, topic: &str, set: &ParameterSet) {
        hub.ingest(Bytes::copy_from_slice(topic.as_bytes()));
        hub.ingest(JsonCodec.encode_parameters(set).unwrap());
    }

    fn opts(buffer_size: usize, distinct: bool) -> SubscribeOptions {
        SubscribeOptions {
            buffer_size,
            distinct,
        }
    }

    #[test]
    fn buffer_of_three_flushes_once_after_three_pairs() {
        let hub = hub();
        let mut sub = hub.subscribe("t", opts(3, false)).unwrap();

        publish(&hub, "t", &payload(1));
        publish(&hub, "t", &payload(2));
        assert!(sub.try_recv().is_none());

        publish(&hub, "t", &payload(3));
        let batch = sub.try_recv().unwrap().unwrap();
        assert_eq!(batch, vec![payload(1), payload(2), payload(3)]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn accumulator_clears_after_flush() {
        let hub = hub();
        let mut sub = hub.subscribe("t", opts(2, false)).unwrap();
        for i in 0..5 {
            publish(&hub, "t", &payload(i));
        }
        assert_eq!(sub.try_recv().unwrap().unwrap(), vec![payload(0), payload(1)]);
        assert_eq!(sub.try_recv().unwrap().unwrap(), vec![payload(2), payload(3)]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn other_topics_are_filtered_out() {
        let hub = hub();
        let mut sub = hub.subscribe("status", SubscribeOptions::default()).unwrap();
        publish(&hub, "position", &payload(9));
        publish(&hub, "status", &payload(1));
        assert_eq!(sub.try_recv().unwrap().unwrap(), vec![payload(1)]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn distinct_suppresses_consecutive_duplicates() {
        let hub = hub();
        let mut sub = hub.subscribe("t", opts(1, true)).unwrap();
        publish(&hub, "t", &payload(1));
        publish(&hub, "t", &payload(1));
        publish(&hub, "t", &payload(2));
        publish(&hub, "t", &payload(1));

        let got: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(got, vec![vec![payload(1)], vec![payload(2)], vec![payload(1)]]);
    }

    #[test]
    fn without_distinct_duplicates_pass() {
        let hub = hub();
        let mut sub = hub.subscribe("t", SubscribeOptions::default()).unwrap();
        publish(&hub, "t", &payload(1));
        publish(&hub, "t", &payload(1));
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn distinct_on_empty_payloads_fails_the_subscription() {
        let hub = hub();
        let mut sub = hub.subscribe("t", opts(1, true)).unwrap();
        publish(&hub, "t", &ParameterSet::default());
        // First payload has nothing to compare against and is delivered.
        assert_eq!(sub.try_recv().unwrap().unwrap(), vec![ParameterSet::default()]);

        publish(&hub, "t", &ParameterSet::default());
        assert_matches!(
            sub.try_recv(),
            Some(Err(HubError::MalformedComparison { previous: 0, next: 0 }))
        );
        assert!(hub.is_empty());

        publish(&hub, "t", &payload(1));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn undecodable_payload_fails_only_that_subscription() {
        let hub = hub();
        let mut bad = hub.subscribe("t", SubscribeOptions::default()).unwrap();
        let mut other = hub.subscribe("u", SubscribeOptions::default()).unwrap();

        hub.ingest(Bytes::from_static(b"t"));
        hub.ingest(Bytes::from_static(b"not json"));
        assert_matches!(bad.try_recv(), Some(Err(HubError::Decode(_))));
        assert_eq!(hub.len(), 1);

        publish(&hub, "u", &payload(4));
        assert_eq!(other.try_recv().unwrap().unwrap(), vec![payload(4)]);
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let hub = hub();
        assert_matches!(
            hub.subscribe("t", opts(0, false)),
            Err(HubError::InvalidBufferSize)
        );
        assert!(hub.is_empty());
    }

    #[test]
    fn unsubscribe_discards_partial_batch() {
        let hub = hub();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let h = hub
            .subscribe_with("t", opts(2, false), move |b| sink.lock().push(b))
            .unwrap();

        publish(&hub, "t", &payload(1));
        hub.unsubscribe(h);
        publish(&hub, "t", &payload(2));
        publish(&hub, "t", &payload(3));

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = hub();
        let h = hub.subscribe_with("t", SubscribeOptions::default(), |_| {}).unwrap();
        hub.unsubscribe(h);
        hub.unsubscribe(h);
        assert!(hub.is_empty());
    }

    #[test]
    fn unsubscribe_all_empties_table() {
        let hub = hub();
        let mut a = hub.subscribe("a", SubscribeOptions::default()).unwrap();
        let mut b = hub.subscribe("b", opts(2, true)).unwrap();
        assert_eq!(hub.len(), 2);

        hub.unsubscribe_all();
        hub.unsubscribe_all();
        assert!(hub.is_empty());

        publish(&hub, "a", &payload(1));
        publish(&hub, "b", &payload(1));
        publish(&hub, "b", &payload(2));
        assert!(a.try_recv().is_none());
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = hub();
        let sub = hub.subscribe("t", SubscribeOptions::default()).unwrap();
        assert_eq!(hub.len(), 1);
        drop(sub);
        assert!(hub.is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let hub = Arc::new(hub());
        let hub2 = Arc::clone(&hub);
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let slot2 = Arc::clone(&slot);
        let count = Arc::new(Mutex::new(0));
        let count2 = Arc::clone(&count);
        let h = hub
            .subscribe_with("t", SubscribeOptions::default(), move |_| {
                *count2.lock() += 1;
                if let Some(h) = *slot2.lock() {
                    hub2.unsubscribe(h);
                }
            })
            .unwrap();
        *slot.lock() = Some(h);

        publish(&hub, "t", &payload(1));
        publish(&hub, "t", &payload(2));
        assert_eq!(*count.lock(), 1);
        assert!(hub.is_empty());
    }

    #[test]
    fn sibling_unsubscribed_by_earlier_callback_gets_nothing() {
        let hub = Arc::new(hub());
        let hub2 = Arc::clone(&hub);
        let target: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let target2 = Arc::clone(&target);
        let _first = hub
            .subscribe_with("t", SubscribeOptions::default(), move |_| {
                if let Some(h) = *target2.lock() {
                    hub2.unsubscribe(h);
                }
            })
            .unwrap();
        let hits = Arc::new(Mutex::new(0));
        let hits2 = Arc::clone(&hits);
        let second = hub
            .subscribe_with("t", SubscribeOptions::default(), move |_| {
                *hits2.lock() += 1;
            })
            .unwrap();
        *target.lock() = Some(second);

        publish(&hub, "t", &payload(1));
        assert_eq!(*hits.lock(), 0);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn malformed_payload_fails_every_matching_subscription() {
        let hub = hub();
        let mut a = hub.subscribe("t", opts(1, false)).unwrap();
        let mut b = hub.subscribe("t", opts(2, false)).unwrap();
        hub.ingest(Bytes::from_static(b"t"));
        hub.ingest(Bytes::from_static(b"{broken"));
        assert_matches!(a.try_recv(), Some(Err(HubError::Decode(_))));
        assert_matches!(b.try_recv(), Some(Err(HubError::Decode(_))));
        assert!(hub.is_empty());
    }

    #[test]
    fn subscription_debug_shows_handle() {
        let hub = hub();
        let sub = hub.subscribe("t", opts(1, false)).unwrap();
        assert!(format!("{sub:?}").contains("TopicSubscription"));
    }

    #[test]
    fn each_subscription_batches_independently() {
        let hub = hub();
        let mut single = hub.subscribe("t", opts(1, false)).unwrap();
        let mut pairs = hub.subscribe("t", opts(2, false)).unwrap();
        publish(&hub, "t", &payload(1));
        assert!(single.try_recv().is_some());
        assert!(pairs.try_recv().is_none());
        publish(&hub, "t", &payload(2));
        assert!(single.try_recv().is_some());
        assert_eq!(pairs.try_recv().unwrap().unwrap().len(), 2);
    }
}
