//! Chat socket frame codec.
//!
//! Inbound frames are JSON objects discriminated by a `type` field; outbound
//! frames carry an `action` field. Frames with an unknown `type` are kept as
//! [`InboundEvent::Other`] so subscribers can still see them.

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use chatlink_core::prelude::*;
use chatlink_core::{InboundEvent, OutboundAction};

/// Query parameter carrying the access token on the socket URL.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the frame is not JSON, has no string `type`
/// field, or a known `type` is missing required fields.
pub fn decode_frame(text: &str) -> Result<InboundEvent> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::protocol(format!("malformed frame: {e}")))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::protocol("frame has no `type` field"))?
        .to_string();

    let event = match kind.as_str() {
        "chat_message" => InboundEvent::ChatMessage(from_payload(value, &kind)?),
        "friend_request" => InboundEvent::FriendRequest(from_payload(value, &kind)?),
        "friend_request_accepted" => {
            InboundEvent::FriendRequestAccepted(from_payload(value, &kind)?)
        }
        "friend_delete" => InboundEvent::FriendDelete(from_payload(value, &kind)?),
        "incoming_call" => InboundEvent::IncomingCall(from_payload(value, &kind)?),
        "call_answer" => InboundEvent::CallAnswer(from_payload(value, &kind)?),
        "error" => InboundEvent::Error {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error")
                .to_string(),
            transport: false,
        },
        _ => InboundEvent::Other { kind, raw: value },
    };

    Ok(event)
}

fn from_payload<T: DeserializeOwned>(value: Value, kind: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::protocol(format!("invalid `{kind}` frame: {e}")))
}

/// Encode one outbound action as a text frame.
pub fn encode_action(action: &OutboundAction) -> Result<String> {
    Ok(serde_json::to_string(action)?)
}

/// Build the authenticated socket URL from the configured base URL.
///
/// Any existing `token` parameter is replaced; other parameters are kept.
pub fn chat_socket_url(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != TOKEN_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(TOKEN_QUERY_PARAM, token);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_core::{MediaCategory, UserId};

    #[test]
    fn test_decode_chat_message() {
        let frame = r#"{
            "type": "chat_message",
            "from": 7,
            "content": "cześć",
            "timestamp": "2025-05-01 12:00:00.123456+00:00"
        }"#;
        match decode_frame(frame).unwrap() {
            InboundEvent::ChatMessage(msg) => {
                assert_eq!(msg.from, UserId(7));
                assert_eq!(msg.content, "cześć");
                assert!(msg.file.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_chat_message_with_attachment() {
        let frame = r#"{"type":"chat_message","from":1,"content":"","timestamp":"2025-05-01T10:00:00Z","file":"http://h/m.jpg","file_type":"image"}"#;
        let InboundEvent::ChatMessage(msg) = decode_frame(frame).unwrap() else {
            panic!("expected chat_message");
        };
        assert_eq!(msg.file_type, Some(MediaCategory::Image));
        assert!(msg.to_message().attachment.is_some());
    }

    #[test]
    fn test_decode_incoming_call() {
        let frame = r#"{"type":"incoming_call","caller":3,"call_id":41}"#;
        assert_eq!(
            decode_frame(frame).unwrap(),
            InboundEvent::IncomingCall(chatlink_core::IncomingCall {
                caller: UserId(3),
                call_id: 41
            })
        );
    }

    #[test]
    fn test_decode_friend_notice_without_fields() {
        let event = decode_frame(r#"{"type":"friend_delete"}"#).unwrap();
        assert!(event.invalidates_friends());
    }

    #[test]
    fn test_decode_server_error_frame() {
        let event = decode_frame(r#"{"type":"error","message":"nope"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Error {
                message: "nope".to_string(),
                transport: false,
            }
        );
        assert!(!event.is_transport_error());
    }

    #[test]
    fn test_decode_unknown_type_keeps_raw() {
        let event = decode_frame(r#"{"type":"typing","from":2}"#).unwrap();
        match event {
            InboundEvent::Other { kind, raw } => {
                assert_eq!(kind, "typing");
                assert_eq!(raw["from"], 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = decode_frame("not json").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        let err = decode_frame(r#"{"from": 1}"#).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_decode_rejects_chat_message_missing_fields() {
        let err = decode_frame(r#"{"type":"chat_message","from":1}"#).unwrap_err();
        assert!(err.to_string().contains("chat_message"));
    }

    #[test]
    fn test_encode_action() {
        let json = encode_action(&OutboundAction::AnswerCall {
            call_id: 5,
            accepted: false,
        })
        .unwrap();
        let val: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val["action"], "answer_call");
        assert_eq!(val["call_id"], 5);
        assert_eq!(val["accepted"], false);
    }

    #[test]
    fn test_chat_socket_url_appends_token() {
        let base = Url::parse("ws://10.0.0.2:8000/ws/chat/").unwrap();
        let url = chat_socket_url(&base, "abc.def");
        assert_eq!(url.as_str(), "ws://10.0.0.2:8000/ws/chat/?token=abc.def");
    }

    #[test]
    fn test_chat_socket_url_replaces_existing_token() {
        let base = Url::parse("ws://host/ws/chat/?v=2&token=old").unwrap();
        let url = chat_socket_url(&base, "new");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("v".to_string(), "2".to_string()),
                ("token".to_string(), "new".to_string())
            ]
        );
    }
}
