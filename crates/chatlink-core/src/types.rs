//! Core domain type definitions

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────

/// Server-side user id. Peers, senders and friends are all users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Locally assigned id for a message that has not been confirmed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientMessageId(u64);

static CLIENT_MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ClientMessageId {
    /// Allocate the next process-unique client id.
    pub fn next() -> Self {
        Self(CLIENT_MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────

/// Coarse media category of an attachment, as carried in `file_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    #[serde(other)]
    File,
}

/// Attachment descriptor: where the file lives and what kind it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub url: String,
    pub category: MediaCategory,
}

impl Attachment {
    /// Build an attachment from the optional `file`/`file_type` wire pair.
    ///
    /// A missing category defaults to [`MediaCategory::File`]; a missing url
    /// means there is no attachment.
    pub fn from_wire(file: Option<String>, file_type: Option<MediaCategory>) -> Option<Self> {
        let url = file.filter(|u| !u.is_empty())?;
        Some(Self {
            url,
            category: file_type.unwrap_or(MediaCategory::File),
        })
    }
}

/// Delivery state of a message in a local thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Sent locally, not yet seen in server history.
    Pending,
    /// Known to the server (received from it, or matched in history).
    Confirmed,
    /// Could not be handed to the transport.
    Failed,
}

/// A chat message. Values are replaced, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Server primary key, when the message came from history.
    pub server_id: Option<i64>,
    /// Local id, for messages this client created.
    pub client_id: Option<ClientMessageId>,
    pub sender: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub attachment: Option<Attachment>,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// Create a provisional outgoing message.
    pub fn provisional(sender: UserId, text: impl Into<String>) -> Self {
        Self {
            server_id: None,
            client_id: Some(ClientMessageId::next()),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
            attachment: None,
            status: MessageStatus::Pending,
        }
    }

    /// Create a message the server has already accepted.
    pub fn confirmed(sender: UserId, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            server_id: None,
            client_id: None,
            sender,
            text: text.into(),
            timestamp,
            attachment: None,
            status: MessageStatus::Confirmed,
        }
    }

    pub fn with_server_id(mut self, id: i64) -> Self {
        self.server_id = Some(id);
        self
    }

    pub fn with_attachment(mut self, attachment: Option<Attachment>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Return a copy of this message in another delivery state.
    pub fn with_status(&self, status: MessageStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    /// Identity used to recognise the same server message across fetches.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            sender: self.sender,
            timestamp_micros: self.timestamp.timestamp_micros(),
            text: self.text.clone(),
        }
    }
}

/// Fingerprint of a server message.
///
/// Live socket events carry no primary key, so identity is the triple the
/// server stores for every row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub sender: UserId,
    pub timestamp_micros: i64,
    pub text: String,
}

// ─────────────────────────────────────────────────────────
// Friend / request records
// ─────────────────────────────────────────────────────────

/// Entry of the friend list, including the chat preview.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub has_new_message: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Result row of a user search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResult {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub request_sent: bool,
    #[serde(default)]
    pub request_received: bool,
}

/// A pending friend request, as listed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FriendRequest {
    pub id: i64,
    #[serde(default)]
    pub from_user: Option<String>,
    #[serde(default)]
    pub friend: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Received and sent requests in one response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FriendRequests {
    #[serde(default)]
    pub received: Vec<FriendRequest>,
    #[serde(default)]
    pub sent: Vec<FriendRequest>,
}

// ─────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────

/// Access/refresh token pair issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Username/password pair remembered for silent login.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ─────────────────────────────────────────────────────────
// Chat history
// ─────────────────────────────────────────────────────────

/// One stored message as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub sender: UserId,
    pub recipient: UserId,
    pub content: String,
    #[serde(deserialize_with = "deserialize_server_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub file_type: Option<MediaCategory>,
}

impl HistoryRecord {
    pub fn into_message(self) -> ChatMessage {
        let attachment = Attachment::from_wire(self.file, self.file_type);
        ChatMessage::confirmed(self.sender, self.content, self.timestamp)
            .with_server_id(self.id)
            .with_attachment(attachment)
    }
}

/// One page of history, newest first as the server orders it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub data: Vec<HistoryRecord>,
    #[serde(rename = "friendName", default)]
    pub friend_name: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────

/// Parse a timestamp as the server emits it.
///
/// REST responses use RFC 3339 (`2025-05-01T12:00:00.123456Z`); socket events
/// use the Python `str()` form (`2025-05-01 12:00:00.123456+00:00`).
/// Naive values are taken as UTC.
pub fn parse_server_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn deserialize_server_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_server_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
