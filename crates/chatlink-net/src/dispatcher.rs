//! Fan-out of decoded inbound events to subscribers.
//!
//! Every subscriber sees every event; filtering by type or peer is the
//! subscriber's job. Dispatch snapshots the subscriber list before invoking
//! callbacks, so callbacks may subscribe or unsubscribe (themselves or others)
//! without affecting the pass in flight.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{error, trace};

use chatlink_core::InboundEvent;

/// Callback receiving one decoded event.
pub type Subscriber = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Token returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of subscribers for one session.
pub struct EventDispatcher {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback. It receives every event dispatched from now on.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        trace!("subscriber {:?} added", id);
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        let removed = subscribers.len() != before;
        if removed {
            trace!("subscriber {:?} removed", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver `event` to every subscriber registered when the pass starts.
    ///
    /// Runs synchronously on the caller's task. A panicking subscriber is
    /// logged and skipped. Returns the number of subscribers invoked.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let snapshot = self.snapshot();
        for (id, subscriber) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                error!(
                    "subscriber {:?} panicked while handling `{}` event",
                    id,
                    event.kind()
                );
            }
        }
        snapshot.len()
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, Subscriber)> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Subscription guard
// ---------------------------------------------------------------------------

/// A subscription that is removed when dropped.
///
/// Holds only a weak reference, so an outstanding guard never keeps the
/// session alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    dispatcher: Weak<EventDispatcher>,
}

impl Subscription {
    /// Register `callback` on `dispatcher` and return a guard for it.
    pub fn new<F>(dispatcher: &Arc<EventDispatcher>, callback: F) -> Self
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        Self {
            id: dispatcher.subscribe(callback),
            dispatcher: Arc::downgrade(dispatcher),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unsubscribe(self.id);
        }
    }
}
