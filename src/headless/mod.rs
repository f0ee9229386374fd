//! Headless mode - NDJSON session output
//!
//! Signs in, opens the chat session and writes one JSON object per line to
//! stdout for every inbound event and command result. Commands are read from
//! stdin (see [`command::HeadlessCommand`]).
//!
//! # Example Output
//!
//! ```json
//! {"event":"signed_in","user_id":4,"timestamp":1746100801000}
//! {"event":"connected","timestamp":1746100801200}
//! {"event":"message","from":7,"text":"hej","sent_at":"2025-05-01T12:00:03Z","timestamp":1746100803000}
//! ```

pub mod command;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use chatlink_core::{ChatMessage, Friend, FriendRequest, InboundEvent, UserId};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    SignedIn {
        user_id: Option<UserId>,
        timestamp: i64,
    },

    /// No usable credentials; the user must log in.
    SignedOut { timestamp: i64 },

    /// Socket handshake completed (first connect or reconnect).
    Connected { timestamp: i64 },

    /// Chat message pushed by the server.
    Message {
        from: UserId,
        text: String,
        sent_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        timestamp: i64,
    },

    /// Friend records changed server-side.
    FriendsChanged { kind: String, timestamp: i64 },

    /// Any other server event, passed through.
    Signal {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        timestamp: i64,
    },

    /// Current contents of a conversation thread.
    History {
        peer: UserId,
        can_load_more: bool,
        messages: Vec<ChatMessage>,
        timestamp: i64,
    },

    Friends {
        friends: Vec<Friend>,
        received: Vec<FriendRequest>,
        sent: Vec<FriendRequest>,
        timestamp: i64,
    },

    /// A message was handed to the socket.
    Sent {
        peer: UserId,
        client_id: u64,
        timestamp: i64,
    },

    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn signed_in(user_id: Option<UserId>) -> Self {
        Self::SignedIn {
            user_id,
            timestamp: Self::now(),
        }
    }

    pub fn signed_out() -> Self {
        Self::SignedOut {
            timestamp: Self::now(),
        }
    }

    pub fn history(peer: UserId, can_load_more: bool, messages: &[ChatMessage]) -> Self {
        Self::History {
            peer,
            can_load_more,
            messages: messages.to_vec(),
            timestamp: Self::now(),
        }
    }

    pub fn friends(friends: &[Friend], received: &[FriendRequest], sent: &[FriendRequest]) -> Self {
        Self::Friends {
            friends: friends.to_vec(),
            received: received.to_vec(),
            sent: sent.to_vec(),
            timestamp: Self::now(),
        }
    }

    pub fn sent(peer: UserId, client_id: u64) -> Self {
        Self::Sent {
            peer,
            client_id,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }

    /// Translate an inbound socket event.
    pub fn from_inbound(event: &InboundEvent) -> Self {
        let timestamp = Self::now();
        match event {
            InboundEvent::ChatMessage(message) => Self::Message {
                from: message.from,
                text: message.content.clone(),
                sent_at: message.timestamp,
                file: message.file.clone(),
                timestamp,
            },
            InboundEvent::Connected => Self::Connected { timestamp },
            InboundEvent::Error { message, .. } => Self::Error {
                message: message.clone(),
                fatal: false,
                timestamp,
            },
            event if event.invalidates_friends() => Self::FriendsChanged {
                kind: event.kind().to_string(),
                timestamp,
            },
            InboundEvent::Other { kind, raw } => Self::Signal {
                kind: kind.clone(),
                payload: Some(raw.clone()),
                timestamp,
            },
            other => Self::Signal {
                kind: other.kind().to_string(),
                payload: serde_json::to_value(other).ok(),
                timestamp,
            },
        }
    }
}
