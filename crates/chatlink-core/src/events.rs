//! Realtime event definitions
//!
//! Inbound frames are discriminated by `type`, outbound frames by `action`.
//! Decoding and encoding live in `chatlink_net::protocol`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    deserialize_server_timestamp, Attachment, ChatMessage, MediaCategory, UserId,
};

// ─────────────────────────────────────────────────────────
// Inbound payloads
// ─────────────────────────────────────────────────────────

/// A chat message pushed by the server to its recipient.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessageEvent {
    pub from: UserId,
    pub content: String,
    #[serde(deserialize_with = "deserialize_server_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<MediaCategory>,
}

impl ChatMessageEvent {
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::confirmed(self.from, self.content.clone(), self.timestamp)
            .with_attachment(Attachment::from_wire(self.file.clone(), self.file_type))
    }
}

/// Notice that a friend request or friendship changed server-side.
///
/// Consumers refetch the affected lists rather than patching them, so only
/// loosely-typed identifying fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FriendNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
}

/// Incoming call signal.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IncomingCall {
    pub caller: UserId,
    pub call_id: i64,
}

/// Answer to a call this client placed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CallAnswer {
    pub accepted: bool,
    pub callee: UserId,
}

// ─────────────────────────────────────────────────────────
// InboundEvent
// ─────────────────────────────────────────────────────────

/// A decoded inbound event, as delivered to every subscriber.
///
/// `Connected` and `Error` may be synthesized locally by the connection
/// supervisor; they travel the same path as server events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ChatMessage(ChatMessageEvent),
    FriendRequest(FriendNotice),
    FriendRequestAccepted(FriendNotice),
    FriendDelete(FriendNotice),
    IncomingCall(IncomingCall),
    CallAnswer(CallAnswer),
    /// A server `error` frame, or a locally synthesized transport failure
    /// when `transport` is set.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        transport: bool,
    },
    /// The socket handshake completed.
    Connected,
    /// A well-formed frame with a `type` this client does not model.
    Other {
        kind: String,
        raw: serde_json::Value,
    },
}

impl InboundEvent {
    /// The wire discriminator of this event.
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::ChatMessage(_) => "chat_message",
            InboundEvent::FriendRequest(_) => "friend_request",
            InboundEvent::FriendRequestAccepted(_) => "friend_request_accepted",
            InboundEvent::FriendDelete(_) => "friend_delete",
            InboundEvent::IncomingCall(_) => "incoming_call",
            InboundEvent::CallAnswer(_) => "call_answer",
            InboundEvent::Error { .. } => "error",
            InboundEvent::Connected => "connected",
            InboundEvent::Other { kind, .. } => kind,
        }
    }

    /// Synthetic transport-failure event.
    pub fn transport_error(message: impl Into<String>) -> Self {
        InboundEvent::Error {
            message: message.into(),
            transport: true,
        }
    }

    /// True for a locally synthesized connection failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, InboundEvent::Error { transport: true, .. })
    }

    /// True for events after which friend lists must be refetched.
    pub fn invalidates_friends(&self) -> bool {
        matches!(
            self,
            InboundEvent::FriendRequest(_)
                | InboundEvent::FriendRequestAccepted(_)
                | InboundEvent::FriendDelete(_)
        )
    }
}

// ─────────────────────────────────────────────────────────
// OutboundAction
// ─────────────────────────────────────────────────────────

/// A client-originated socket action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    SendMessage {
        to: UserId,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_type: Option<MediaCategory>,
    },
    FriendRequestSend {
        to: UserId,
    },
    FriendRequestAccept {
        request_id: i64,
    },
    FriendDelete {
        to: UserId,
    },
    CallUser {
        to: UserId,
    },
    AnswerCall {
        call_id: i64,
        accepted: bool,
    },
}

impl OutboundAction {
    /// Plain text message without attachment.
    pub fn text(to: UserId, message: impl Into<String>) -> Self {
        OutboundAction::SendMessage {
            to,
            message: message.into(),
            file: None,
            file_type: None,
        }
    }

    /// The wire discriminator of this action.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundAction::SendMessage { .. } => "send_message",
            OutboundAction::FriendRequestSend { .. } => "friend_request_send",
            OutboundAction::FriendRequestAccept { .. } => "friend_request_accept",
            OutboundAction::FriendDelete { .. } => "friend_delete",
            OutboundAction::CallUser { .. } => "call_user",
            OutboundAction::AnswerCall { .. } => "answer_call",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_send_message_shape() {
        let action = OutboundAction::text(UserId(4), "hello");
        let val = serde_json::to_value(&action).unwrap();
        assert_eq!(val["action"], "send_message");
        assert_eq!(val["to"], 4);
        assert_eq!(val["message"], "hello");
        assert!(!val.as_object().unwrap().contains_key("file"));
    }

    #[test]
    fn test_outbound_send_message_with_file() {
        let action = OutboundAction::SendMessage {
            to: UserId(4),
            message: String::new(),
            file: Some("http://host/media/v.mp4".into()),
            file_type: Some(MediaCategory::Video),
        };
        let val = serde_json::to_value(&action).unwrap();
        assert_eq!(val["file"], "http://host/media/v.mp4");
        assert_eq!(val["file_type"], "video");
    }

    #[test]
    fn test_outbound_action_names_match_tags() {
        let actions = [
            OutboundAction::text(UserId(1), "x"),
            OutboundAction::FriendRequestSend { to: UserId(1) },
            OutboundAction::FriendRequestAccept { request_id: 9 },
            OutboundAction::FriendDelete { to: UserId(1) },
            OutboundAction::CallUser { to: UserId(1) },
            OutboundAction::AnswerCall {
                call_id: 2,
                accepted: true,
            },
        ];
        for action in actions {
            let val = serde_json::to_value(&action).unwrap();
            assert_eq!(val["action"], action.name());
        }
    }

    #[test]
    fn test_inbound_kind_and_serialized_tag_agree() {
        let event = InboundEvent::transport_error("boom");
        let val = serde_json::to_value(&event).unwrap();
        assert_eq!(val["type"], event.kind());
        assert_eq!(val["message"], "boom");
    }

    #[test]
    fn test_invalidates_friends() {
        assert!(InboundEvent::FriendDelete(FriendNotice::default()).invalidates_friends());
        assert!(InboundEvent::FriendRequestAccepted(FriendNotice::default()).invalidates_friends());
        assert!(!InboundEvent::Connected.invalidates_friends());
    }
}
