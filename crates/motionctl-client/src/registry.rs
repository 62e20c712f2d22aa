//! Handle-keyed publish/subscribe registry.
//!
//! Callbacks are invoked outside the lock, so a callback may subscribe,
//! unsubscribe or send without deadlocking. Delivery order follows
//! subscription order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque identifier of one live subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Monotonic source of [`SubscriptionHandle`]s.
#[derive(Debug, Default)]
pub(crate) struct HandleSeq(AtomicU64);

impl HandleSeq {
    pub(crate) fn next(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared callback invoked for every published item.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Mapping from subscription handle to callback.
pub struct Registry<T> {
    handles: HandleSeq,
    entries: Mutex<BTreeMap<SubscriptionHandle, Callback<T>>>,
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handles: HandleSeq::default(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a callback and return its handle.
    pub fn insert(&self, callback: Callback<T>) -> SubscriptionHandle {
        let handle = self.handles.next();
        let _ = self.entries.lock().insert(handle, callback);
        handle
    }

    /// Remove a callback. Returns `false` if the handle was unknown.
    pub fn remove(&self, handle: SubscriptionHandle) -> bool {
        self.entries.lock().remove(&handle).is_some()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no subscription is live.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Invoke every live callback with `item`. Returns how many were invoked.
    ///
    /// A callback removed by an earlier callback during the same publish is
    /// skipped.
    pub fn publish(&self, item: &T) -> usize {
        let snapshot: Vec<(SubscriptionHandle, Callback<T>)> = self
            .entries
            .lock()
            .iter()
            .map(|(handle, callback)| (*handle, Arc::clone(callback)))
            .collect();

        let mut invoked = 0;
        for (handle, callback) in snapshot {
            if !self.entries.lock().contains_key(&handle) {
                continue;
            }
            callback(item);
            invoked += 1;
        }
        invoked
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
