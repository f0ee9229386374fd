//! The shared session handle.
//!
//! A [`Session`] is constructed once by the application and cloned into every
//! consumer that needs the socket. Clones share one supervisor and one
//! subscriber registry.

use std::sync::Arc;

use tokio::sync::mpsc;

use chatlink_core::prelude::*;
use chatlink_core::{InboundEvent, OutboundAction};

use crate::dispatcher::{EventDispatcher, Subscription, SubscriptionId};
use crate::supervisor::{ConnectionState, ConnectionSupervisor, SessionOptions};

/// Cheaply clonable handle to the process's chat session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    dispatcher: Arc<EventDispatcher>,
    supervisor: ConnectionSupervisor,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let supervisor = ConnectionSupervisor::new(options, Arc::clone(&dispatcher));
        Self {
            inner: Arc::new(SessionInner {
                dispatcher,
                supervisor,
            }),
        }
    }

    /// See [`ConnectionSupervisor::initialize`].
    pub fn initialize(&self, token: &str, force_reconnect: bool) -> bool {
        self.inner.supervisor.initialize(token, force_reconnect)
    }

    /// See [`ConnectionSupervisor::send`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the socket is not connected.
    pub fn send(&self, action: &OutboundAction) -> Result<()> {
        self.inner.supervisor.send(action)
    }

    /// See [`ConnectionSupervisor::close`].
    pub fn close(&self) {
        self.inner.supervisor.close()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }

    /// Subscribe for as long as the returned guard lives.
    pub fn subscribe_guarded<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        Subscription::new(&self.inner.dispatcher, callback)
    }

    /// Subscribe by forwarding every event into a channel.
    ///
    /// For consumers that handle events on their own task instead of the
    /// connection task. Delivery stops when the guard is dropped.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.subscribe_guarded(move |event| {
            let _ = tx.send(event.clone());
        });
        (guard, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.supervisor.is_connected()
    }

    /// Token of the active connection, if any.
    pub fn token(&self) -> Option<String> {
        self.inner.supervisor.token()
    }

    pub fn options(&self) -> &SessionOptions {
        self.inner.supervisor.options()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }
}
