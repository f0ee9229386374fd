//! Session state reconciler
//!
//! Merges three sources into consistent per-peer state: history pages from
//! REST, live events from the socket, and provisional messages sent locally.
//!
//! ## Event flow
//!
//! ```text
//! connection task ──dispatch──▶ forwarding closure ──mpsc──▶ ChatReconciler::pump()
//! ```
//!
//! Subscribers run on the connection task, so the reconciler subscribes with a
//! closure that only forwards into a channel and handles events on its own
//! task when [`ChatReconciler::pump`] is called.

use std::collections::HashMap;

use tokio::sync::mpsc;

use chatlink_core::prelude::*;
use chatlink_core::{
    ChatMessage, ChatMessageEvent, ClientMessageId, InboundEvent, MessageStatus, OutboundAction,
    UserId,
};
use chatlink_net::{ChatApi, Session, Subscription};

use crate::conversation::{ConversationThread, PAGE_SIZE};
use crate::friends::FriendDirectory;

/// Conversation and friend state for the signed-in user.
pub struct ChatReconciler {
    session: Session,
    me: UserId,
    page_size: usize,
    open_peer: Option<UserId>,
    threads: HashMap<UserId, ConversationThread>,
    friends: FriendDirectory,
    events: mpsc::UnboundedReceiver<InboundEvent>,
    _subscription: Subscription,
}

impl std::fmt::Debug for ChatReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatReconciler")
            .field("me", &self.me)
            .field("open_peer", &self.open_peer)
            .field("threads", &self.threads.len())
            .finish()
    }
}

impl ChatReconciler {
    pub fn new(session: Session, me: UserId) -> Self {
        let (subscription, events) = session.subscribe_channel();
        Self {
            session,
            me,
            page_size: PAGE_SIZE,
            open_peer: None,
            threads: HashMap::new(),
            friends: FriendDirectory::new(),
            events,
            _subscription: subscription,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn open_peer(&self) -> Option<UserId> {
        self.open_peer
    }

    pub fn thread(&self, peer: UserId) -> Option<&ConversationThread> {
        self.threads.get(&peer)
    }

    pub fn friends(&self) -> &FriendDirectory {
        &self.friends
    }

    pub fn friends_mut(&mut self) -> &mut FriendDirectory {
        &mut self.friends
    }

    fn thread_mut(&mut self, peer: UserId) -> &mut ConversationThread {
        self.threads
            .entry(peer)
            .or_insert_with(|| ConversationThread::new(peer))
    }

    // ─────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────

    /// Open the thread with `peer`: reset it, clear its unread flag, and load
    /// the newest page. Returns `can_load_more`.
    pub async fn select_peer<A: ChatApi>(&mut self, api: &A, peer: UserId) -> Result<bool> {
        self.open_peer = Some(peer);
        self.thread_mut(peer).reset();
        self.friends.clear_unread(peer);
        let limit = self.page_size;
        self.load_history(api, peer, 0, limit).await
    }

    /// Stop routing live messages into a thread.
    pub fn close_peer(&mut self) {
        self.open_peer = None;
    }

    /// Fetch one page. Offset 0 replaces the thread, a larger offset prepends.
    ///
    /// Returns `can_load_more`: false exactly when fewer than `limit` records
    /// arrived.
    pub async fn load_history<A: ChatApi>(
        &mut self,
        api: &A,
        peer: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<bool> {
        let page = api.chat_history(peer, offset, limit).await?;
        let received = page.data.len();
        let me = self.me;
        let can_load_more = self.thread_mut(peer).apply_page(me, offset, page, limit);
        debug!(
            "history for {}: offset {} limit {} -> {} records (more: {})",
            peer, offset, limit, received, can_load_more
        );
        Ok(can_load_more)
    }

    /// Load the next older page of `peer`'s thread.
    ///
    /// Returns `Ok(false)` without a request when the thread is exhausted.
    pub async fn load_more<A: ChatApi>(&mut self, api: &A, peer: UserId) -> Result<bool> {
        let page_size = self.page_size;
        let thread = self.thread_mut(peer);
        if !thread.can_load_more() {
            return Ok(false);
        }
        let offset = if thread.has_history() {
            thread.offset() + page_size
        } else {
            0
        };
        self.load_history(api, peer, offset, page_size).await
    }

    /// Reload the open thread if a reconnect marked it stale, and refetch
    /// friend records if they were invalidated.
    ///
    /// Returns whether the open thread was reloaded.
    pub async fn resync<A: ChatApi>(&mut self, api: &A) -> Result<bool> {
        self.friends.refresh_if_stale(api).await?;

        let Some(peer) = self.open_peer else {
            return Ok(false);
        };
        if !self.thread_mut(peer).needs_resync() {
            return Ok(false);
        }
        info!("resyncing thread with {} after reconnect", peer);
        let limit = self.page_size;
        self.load_history(api, peer, 0, limit).await?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────

    /// Append a provisional message to `peer`'s thread, then transmit it.
    ///
    /// The message is visible before any acknowledgement. If the socket
    /// rejects the frame the message is marked `Failed` and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when the session has no connected socket.
    pub fn send_message(&mut self, peer: UserId, text: &str) -> Result<ClientMessageId> {
        let message = ChatMessage::provisional(self.me, text);
        let id = message
            .client_id
            .ok_or_else(|| Error::protocol("provisional message without client id"))?;
        let timestamp = message.timestamp;
        self.thread_mut(peer).push_provisional(message);
        self.friends.update_preview(peer, text, timestamp, false);

        if let Err(err) = self.session.send(&OutboundAction::text(peer, text)) {
            warn!("message {} to {} not sent: {}", id, peer, err);
            self.thread_mut(peer).set_status(id, MessageStatus::Failed);
            return Err(err);
        }
        Ok(id)
    }

    /// Re-send every failed message in `peer`'s thread.
    ///
    /// Returns how many were handed to the socket again.
    pub fn retry_failed(&mut self, peer: UserId) -> usize {
        let failed = match self.threads.get(&peer) {
            Some(thread) => thread.failed(),
            None => return 0,
        };

        let mut resent = 0;
        for message in failed {
            let Some(id) = message.client_id else {
                continue;
            };
            if self
                .session
                .send(&OutboundAction::text(peer, message.text.as_str()))
                .is_err()
            {
                debug!("retry of {} stopped: socket not connected", id);
                break;
            }
            self.thread_mut(peer).set_status(id, MessageStatus::Pending);
            resent += 1;
        }
        resent
    }

    // ─────────────────────────────────────────────────────────
    // Inbound events
    // ─────────────────────────────────────────────────────────

    /// Apply every event forwarded since the last call. Returns how many were
    /// handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(&event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event, apply it, and return it.
    ///
    /// Returns `None` once the session is gone.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        let event = self.events.recv().await?;
        self.apply_event(&event);
        Some(event)
    }

    pub fn apply_event(&mut self, event: &InboundEvent) {
        match event {
            InboundEvent::ChatMessage(message) => self.apply_chat_message(message),
            // Anything may have happened while the socket was down.
            InboundEvent::Connected => {
                if let Some(peer) = self.open_peer {
                    self.thread_mut(peer).mark_needs_resync();
                }
                self.friends.invalidate();
            }
            // Frames in flight when the socket dropped are lost; a server
            // `error` frame does not say which message it refers to.
            InboundEvent::Error {
                message,
                transport: true,
            } => {
                let failed: usize = self.threads.values_mut().map(|t| t.fail_pending()).sum();
                if failed > 0 {
                    warn!("{} pending message(s) marked failed: {}", failed, message);
                }
            }
            InboundEvent::Error { message, .. } => warn!("server reported an error: {}", message),
            event if event.invalidates_friends() => self.friends.invalidate(),
            other => trace!("reconciler ignoring `{}` event", other.kind()),
        }
    }

    fn apply_chat_message(&mut self, event: &ChatMessageEvent) {
        let peer = event.from;
        let message = event.to_message();
        let is_open = self.open_peer == Some(peer);

        self.friends
            .update_preview(peer, &message.text, message.timestamp, !is_open);

        if is_open && !self.thread_mut(peer).append_live(message) {
            debug!("duplicate live message from {} ignored", peer);
        }
    }
}
