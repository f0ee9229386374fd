//! Session behaviour against a real local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatlink_core::{Error, InboundEvent, OutboundAction, UserId};
use chatlink_net::test_utils::{
    chat_message_frame, recv_event, recv_matching, wait_until, TestChatServer,
};
use chatlink_net::{ConnectionState, ReconnectPolicy, Session, SessionOptions};
use tokio_test::assert_ok;
use url::Url;

fn session_for(server: &TestChatServer) -> Session {
    Session::new(SessionOptions::new(server.socket_url()).unwrap())
}

async fn connected_session(server: &TestChatServer) -> Session {
    let session = session_for(server);
    assert!(session.initialize("tok-1", false));
    assert!(wait_until(|| session.is_connected()).await);
    session
}

#[tokio::test]
async fn test_initialize_twice_keeps_one_connection() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;

    assert!(!session.initialize("tok-1", false));
    assert!(!session.initialize("tok-2", false));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.handshake_count(), 1);
    assert_eq!(server.open_connections(), 1);
    assert_eq!(session.token().as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_initialize_while_connecting_is_noop() {
    let server = TestChatServer::start().await;
    let session = session_for(&server);

    assert!(session.initialize("tok-1", false));
    assert!(!session.initialize("tok-1", false));
    assert!(wait_until(|| session.is_connected()).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.handshake_count(), 1);
}

#[tokio::test]
async fn test_force_reconnect_replaces_connection() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;

    assert!(session.initialize("tok-2", true));
    assert!(wait_until(|| server.handshake_count() == 2).await);
    assert!(server.wait_for_open(1).await);
    assert!(wait_until(|| session.is_connected()).await);

    assert_eq!(server.tokens(), vec!["tok-1".to_string(), "tok-2".to_string()]);
    assert_eq!(server.wait_for_close_codes(1).await, vec![1000]);
}

#[tokio::test]
async fn test_subscribers_observe_frames_in_transport_order() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let record = |seen: &Arc<Mutex<Vec<String>>>| {
        let seen = Arc::clone(seen);
        move |event: &InboundEvent| {
            if let InboundEvent::ChatMessage(message) = event {
                seen.lock().unwrap().push(message.content.clone());
            }
        }
    };
    let _a = session.subscribe_guarded(record(&seen_a));
    let _b = session.subscribe_guarded(record(&seen_b));

    let expected: Vec<String> = (0..20).map(|n| format!("msg-{n}")).collect();
    for text in &expected {
        server.push_json(&chat_message_frame(7, text, "2025-05-01T12:00:00Z"));
    }

    assert!(wait_until(|| seen_b.lock().unwrap().len() == expected.len()).await);
    assert_eq!(*seen_a.lock().unwrap(), expected);
    assert_eq!(*seen_b.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;
    let (_guard, mut rx) = session.subscribe_channel();

    server.push_text("{not json");
    server.push_json(&chat_message_frame(7, "after", "2025-05-01T12:00:00Z"));

    let event = recv_event(&mut rx).await.unwrap();
    assert!(matches!(event, InboundEvent::ChatMessage(ref m) if m.content == "after"));
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_send_reaches_server_as_action_frame() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;

    assert_ok!(session.send(&OutboundAction::text(UserId(7), "hej")));
    assert_ok!(session.send(&OutboundAction::CallUser { to: UserId(7) }));

    let frames = server.wait_for_received(2).await;
    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(first["action"], "send_message");
    assert_eq!(first["to"], 7);
    assert_eq!(first["message"], "hej");
    let second: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
    assert_eq!(second["action"], "call_user");
}

#[tokio::test]
async fn test_send_without_connection_is_dropped() {
    let server = TestChatServer::start().await;
    let session = session_for(&server);
    assert!(matches!(
        session.send(&OutboundAction::text(UserId(7), "lost")),
        Err(Error::NotConnected)
    ));
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn test_close_sends_normal_closure_and_allows_reinitialize() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;

    session.close();
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(server.wait_for_close_codes(1).await, vec![1000]);
    assert!(server.wait_for_open(0).await);

    assert!(session.initialize("tok-2", false));
    assert!(wait_until(|| session.is_connected()).await);
    assert!(wait_until(|| server.handshake_count() == 2).await);
}

#[tokio::test]
async fn test_connected_event_on_every_handshake() {
    let server = TestChatServer::start().await;
    let session = session_for(&server);
    let (_guard, mut rx) = session.subscribe_channel();

    session.initialize("tok-1", false);
    assert_eq!(recv_event(&mut rx).await, Some(InboundEvent::Connected));

    session.initialize("tok-2", true);
    assert!(recv_matching(&mut rx, |e| *e == InboundEvent::Connected)
        .await
        .is_some());
}

#[tokio::test]
async fn test_server_drop_surfaces_error_event() {
    let server = TestChatServer::start().await;
    let session = connected_session(&server).await;
    let (_guard, mut rx) = session.subscribe_channel();

    server.disconnect_all();

    let event = recv_matching(&mut rx, |e| matches!(e, InboundEvent::Error { .. })).await;
    assert!(event.is_some());
    assert!(wait_until(|| session.state() == ConnectionState::Closed).await);

    // The lifecycle owner decides when to come back.
    assert!(session.initialize("tok-1", false));
    assert!(wait_until(|| session.is_connected()).await);
}

#[tokio::test]
async fn test_unreachable_server_reports_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/chat/")).unwrap();
    let session = Session::new(SessionOptions::new(url).unwrap());
    let (_guard, mut rx) = session.subscribe_channel();

    assert!(session.initialize("tok", false));
    let event = recv_event(&mut rx).await.unwrap();
    assert!(event.is_transport_error());
    assert!(wait_until(|| session.state() == ConnectionState::Closed).await);
}

#[tokio::test]
async fn test_auto_reconnect_after_drop() {
    let server = TestChatServer::start().await;
    let options = SessionOptions::new(server.socket_url())
        .unwrap()
        .with_reconnect(ReconnectPolicy {
            enabled: true,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(100),
        });
    let session = Session::new(options);
    let (_guard, mut rx) = session.subscribe_channel();

    session.initialize("tok", false);
    assert_eq!(recv_event(&mut rx).await, Some(InboundEvent::Connected));

    server.disconnect_all();
    assert!(recv_matching(&mut rx, |e| *e == InboundEvent::Connected)
        .await
        .is_some());
    assert!(wait_until(|| server.handshake_count() == 2).await);
    assert_eq!(server.tokens(), vec!["tok".to_string(), "tok".to_string()]);
}
