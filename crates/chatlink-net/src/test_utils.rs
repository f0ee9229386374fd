//! Test utilities for the chat socket
//!
//! Provides a local WebSocket server standing in for the chat backend, plus
//! helpers for awaiting events from a session channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use url::Url;

use chatlink_core::InboundEvent;

/// Default wait used by the helpers below.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Instruction pushed from a test to every open server-side connection.
#[derive(Debug, Clone)]
pub enum ServerPush {
    /// Send a text frame.
    Text(String),
    /// Drop the TCP connection without a close frame.
    Disconnect,
    /// Send a close frame with the given code.
    Close(u16),
}

#[derive(Default)]
struct ServerState {
    handshakes: AtomicUsize,
    open: AtomicUsize,
    request_uris: Mutex<Vec<String>>,
    received: Mutex<Vec<String>>,
    close_codes: Mutex<Vec<u16>>,
}

/// Local chat socket server.
///
/// Records handshake URIs, every text frame it receives and the close codes
/// clients send. Frames pushed with [`push_text`](Self::push_text) go to all
/// open connections.
pub struct TestChatServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    push_tx: broadcast::Sender<ServerPush>,
    accept_task: JoinHandle<()>,
}

impl TestChatServer {
    /// Bind to an ephemeral port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test chat server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ServerState::default());
        let (push_tx, _) = broadcast::channel(64);

        let accept_state = Arc::clone(&state);
        let accept_push = push_tx.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                // Subscribe before the handshake so no push is missed.
                let push_rx = accept_push.subscribe();
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&accept_state),
                    push_rx,
                ));
            }
        });

        Self {
            addr,
            state,
            push_tx,
            accept_task,
        }
    }

    /// Socket endpoint without a token, as a session would be configured.
    pub fn socket_url(&self) -> Url {
        Url::parse(&format!("ws://{}/ws/chat/", self.addr)).expect("socket url")
    }

    /// Completed handshakes since start.
    pub fn handshake_count(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// `token` query values of every handshake, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.state
            .request_uris
            .lock()
            .expect("uris lock")
            .iter()
            .filter_map(|uri| {
                let url = Url::parse(&format!("ws://localhost{uri}")).ok()?;
                url.query_pairs()
                    .find(|(k, _)| k == "token")
                    .map(|(_, v)| v.into_owned())
            })
            .collect()
    }

    /// Text frames received from clients, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().expect("received lock").clone()
    }

    /// Close codes sent by clients.
    pub fn close_codes(&self) -> Vec<u16> {
        self.state.close_codes.lock().expect("close lock").clone()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(ServerPush::Text(text.into()));
    }

    pub fn push_json(&self, value: &serde_json::Value) {
        self.push_text(value.to_string());
    }

    pub fn disconnect_all(&self) {
        let _ = self.push_tx.send(ServerPush::Disconnect);
    }

    pub fn close_all(&self, code: u16) {
        let _ = self.push_tx.send(ServerPush::Close(code));
    }

    /// Wait until at least `n` frames have been received.
    pub async fn wait_for_received(&self, n: usize) -> Vec<String> {
        wait_until(|| self.received().len() >= n).await;
        self.received()
    }

    /// Wait until exactly `n` connections are open.
    pub async fn wait_for_open(&self, n: usize) -> bool {
        wait_until(|| self.open_connections() == n).await
    }

    /// Wait until at least `n` close codes were recorded.
    pub async fn wait_for_close_codes(&self, n: usize) -> Vec<u16> {
        wait_until(|| self.close_codes().len() >= n).await;
        self.close_codes()
    }
}

impl Drop for TestChatServer {
    fn drop(&mut self) {
        let _ = self.push_tx.send(ServerPush::Disconnect);
        self.accept_task.abort();
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    mut push_rx: broadcast::Receiver<ServerPush>,
) {
    let uri_state = Arc::clone(&state);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        uri_state
            .request_uris
            .lock()
            .expect("uris lock")
            .push(request.uri().to_string());
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    state.handshakes.fetch_add(1, Ordering::SeqCst);
    state.open.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    state.received.lock().expect("received lock").push(text.as_str().to_string());
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    state.close_codes.lock().expect("close lock").push(code);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            push = push_rx.recv() => match push {
                Ok(ServerPush::Text(text)) => {
                    if ws.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(ServerPush::Close(code)) => {
                    let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
                        code: code.into(),
                        reason: "server closing".into(),
                    };
                    let _ = ws.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
                Ok(ServerPush::Disconnect) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }

    state.open.fetch_sub(1, Ordering::SeqCst);
}

/// Poll `condition` every 10ms until it holds or [`DEFAULT_WAIT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + DEFAULT_WAIT;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receive the next event, or `None` after [`DEFAULT_WAIT`].
pub async fn recv_event(rx: &mut mpsc::UnboundedReceiver<InboundEvent>) -> Option<InboundEvent> {
    tokio::time::timeout(DEFAULT_WAIT, rx.recv())
        .await
        .ok()
        .flatten()
}

/// Receive events until one matches `predicate`, returning it.
pub async fn recv_matching(
    rx: &mut mpsc::UnboundedReceiver<InboundEvent>,
    mut predicate: impl FnMut(&InboundEvent) -> bool,
) -> Option<InboundEvent> {
    let deadline = tokio::time::Instant::now() + DEFAULT_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, rx.recv()).await.ok().flatten()?;
        if predicate(&event) {
            return Some(event);
        }
    }
}

/// A `chat_message` frame as the server sends it.
pub fn chat_message_frame(from: i64, content: &str, timestamp: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "chat_message",
        "from": from,
        "content": content,
        "timestamp": timestamp,
    })
}
