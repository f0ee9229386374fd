//! Conversation thread state
//!
//! A [`ConversationThread`] holds the messages exchanged with one peer in
//! chronological order (newest last), the pagination cursor, and the keys of
//! every server message it already holds so overlapping pages never produce
//! duplicates.

use std::collections::HashSet;

use chrono::Duration;

use chatlink_core::{
    ChatMessage, ClientMessageId, HistoryPage, MessageKey, MessageStatus, UserId,
};

/// History records requested per page.
pub const PAGE_SIZE: usize = 50;

/// How far a server timestamp may lag the local clock and still confirm a
/// provisional message.
const CLOCK_SKEW_SECS: i64 = 120;

/// Messages and pagination state for one peer.
#[derive(Debug, Clone)]
pub struct ConversationThread {
    peer: UserId,
    peer_name: Option<String>,
    messages: Vec<ChatMessage>,
    offset: usize,
    can_load_more: bool,
    known: HashSet<MessageKey>,
    loaded: bool,
    needs_resync: bool,
}

impl ConversationThread {
    pub fn new(peer: UserId) -> Self {
        Self {
            peer,
            peer_name: None,
            messages: Vec::new(),
            offset: 0,
            can_load_more: true,
            known: HashSet::new(),
            loaded: false,
            needs_resync: false,
        }
    }

    pub fn peer(&self) -> UserId {
        self.peer
    }

    /// Display name reported with the last history page.
    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Offset of the oldest page loaded so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn can_load_more(&self) -> bool {
        self.can_load_more
    }

    /// True once any history page has been applied.
    pub fn has_history(&self) -> bool {
        self.loaded
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn mark_needs_resync(&mut self) {
        self.needs_resync = true;
    }

    /// Forget everything and return to "nothing loaded".
    pub fn reset(&mut self) {
        self.messages.clear();
        self.known.clear();
        self.offset = 0;
        self.can_load_more = true;
        self.loaded = false;
        self.needs_resync = false;
    }

    // ─────────────────────────────────────────────────────────
    // History pages
    // ─────────────────────────────────────────────────────────

    /// Merge one history page fetched at `offset` with `limit`.
    ///
    /// Offset 0 replaces the loaded history; a larger offset prepends older
    /// records. Records already present are skipped. An own pending or failed
    /// message whose server record appears in the page becomes `Confirmed`:
    /// the record must be new to this thread, carry the same text, and be no
    /// older than the local send time minus the clock-skew allowance.
    ///
    /// Returns `can_load_more`, which is false exactly when the page held
    /// fewer than `limit` records.
    pub fn apply_page(
        &mut self,
        me: UserId,
        offset: usize,
        page: HistoryPage,
        limit: usize,
    ) -> bool {
        self.can_load_more = page.data.len() >= limit;
        self.offset = offset;
        self.loaded = true;
        if page.friend_name.is_some() {
            self.peer_name = page.friend_name;
        }

        // Server pages are newest first.
        let incoming: Vec<ChatMessage> = page
            .data
            .into_iter()
            .rev()
            .map(|record| record.into_message())
            .collect();

        if offset == 0 {
            self.replace_with(me, incoming);
            self.needs_resync = false;
        } else {
            self.prepend(incoming);
        }

        self.can_load_more
    }

    fn replace_with(&mut self, me: UserId, mut incoming: Vec<ChatMessage>) {
        let newest_incoming = incoming.last().map(|m| m.timestamp);
        let incoming_keys: HashSet<MessageKey> = incoming.iter().map(ChatMessage::key).collect();
        let mut claimed = vec![false; incoming.len()];
        let skew = Duration::seconds(CLOCK_SKEW_SECS);

        let locals = std::mem::take(&mut self.messages);
        let mut keep = vec![false; locals.len()];

        // Newest local first, so repeated texts pair newest with newest.
        for (li, local) in locals.iter().enumerate().rev() {
            match local.status {
                MessageStatus::Pending | MessageStatus::Failed => {
                    let earliest = local.timestamp - skew;
                    let hit = incoming.iter().enumerate().rposition(|(i, server)| {
                        !claimed[i]
                            && server.sender == me
                            && server.text == local.text
                            && server.timestamp >= earliest
                            && !self.known.contains(&server.key())
                    });
                    match hit {
                        Some(i) => {
                            claimed[i] = true;
                            incoming[i].client_id = local.client_id;
                        }
                        None => keep[li] = true,
                    }
                }
                MessageStatus::Confirmed => {
                    let key = local.key();
                    if incoming_keys.contains(&key) {
                        if let Some(server) = incoming.iter_mut().find(|m| m.key() == key) {
                            server.client_id = server.client_id.or(local.client_id);
                        }
                    } else {
                        // Live messages newer than the page are kept.
                        keep[li] = newest_incoming.map_or(true, |ts| local.timestamp > ts);
                    }
                }
            }
        }

        let carried: Vec<ChatMessage> = locals
            .into_iter()
            .zip(keep)
            .filter_map(|(message, keep)| keep.then_some(message))
            .collect();

        self.known = incoming_keys;
        for message in &carried {
            if message.status == MessageStatus::Confirmed {
                self.known.insert(message.key());
            }
        }
        self.messages = incoming;
        self.messages.extend(carried);
    }

    fn prepend(&mut self, incoming: Vec<ChatMessage>) {
        let mut older: Vec<ChatMessage> = Vec::with_capacity(incoming.len());
        for message in incoming {
            if self.known.insert(message.key()) {
                older.push(message);
            }
        }
        older.append(&mut self.messages);
        self.messages = older;
    }

    // ─────────────────────────────────────────────────────────
    // Live updates
    // ─────────────────────────────────────────────────────────

    /// Append a message received over the socket. Returns `false` for a
    /// duplicate.
    pub fn append_live(&mut self, message: ChatMessage) -> bool {
        if !self.known.insert(message.key()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Append a provisional outgoing message.
    pub fn push_provisional(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the status of the local message `id`. Returns `false` if no
    /// such message exists.
    pub fn set_status(&mut self, id: ClientMessageId, status: MessageStatus) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.client_id == Some(id) && m.status != MessageStatus::Confirmed)
        {
            Some(message) => {
                *message = message.with_status(status);
                true
            }
            None => false,
        }
    }

    /// Mark every pending message failed. Returns how many changed.
    pub fn fail_pending(&mut self) -> usize {
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| m.is_pending()) {
            *message = message.with_status(MessageStatus::Failed);
            changed += 1;
        }
        changed
    }

    /// Local messages currently marked failed, oldest first.
    pub fn failed(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.status == MessageStatus::Failed)
            .cloned()
            .collect()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
