//! Connection supervisor for the chat socket.
//!
//! Owns at most one live WebSocket per session. Each connection is driven by
//! a background Tokio task that reads frames, decodes them, and dispatches
//! them synchronously to the session's subscribers. The public API talks to
//! that task over an unbounded command channel and never blocks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   ConnectionSupervisor                      │
//! │                                                             │
//! │  initialize() ──spawn──▶ ┌──────────────────────────────┐   │
//! │                          │   Connection task (per gen)   │   │
//! │  send()   ─────cmd─────▶ │   connect → read/write loop   │   │
//! │  close()  ─────cmd─────▶ │   decode → EventDispatcher    │   │
//! │                          └──────────────────────────────┘   │
//! │                                                             │
//! │  Transport failures become InboundEvent::Error on the       │
//! │  dispatcher; they are never returned from the task.         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! A generation counter tags every spawned task. A task that has been
//! superseded by a forced re-initialize never touches the shared state again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use chatlink_core::prelude::*;
use chatlink_core::{InboundEvent, OutboundAction};

use crate::dispatcher::EventDispatcher;
use crate::protocol::{chat_socket_url, decode_frame, encode_action};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of automatic reconnection attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial backoff delay for automatic reconnection.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff delay for automatic reconnection.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reason sent with the normal-closure frame.
const CLOSE_REASON: &str = "client closing";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Automatic reconnection behaviour after an unexpected disconnect.
///
/// Disabled by default: the lifecycle binder decides when to reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before reconnection attempt `attempt` (1-indexed).
    ///
    /// The formula is `initial_backoff * 2^(attempt-1)`, capped at
    /// `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier: u64 = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let initial_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(initial_ms.saturating_mul(multiplier).min(max_ms))
    }
}

/// Where and how a session connects.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Socket endpoint without the token, e.g. `ws://host:8000/ws/chat/`.
    pub socket_url: Url,
    pub reconnect: ReconnectPolicy,
}

impl SessionOptions {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `socket_url` is not a `ws` or `wss` URL.
    pub fn new(socket_url: Url) -> Result<Self> {
        match socket_url.scheme() {
            "ws" | "wss" => Ok(Self {
                socket_url,
                reconnect: ReconnectPolicy::default(),
            }),
            other => Err(Error::config(format!(
                "socket URL must use ws:// or wss://, got {other}://"
            ))),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Current state of the session's socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// `initialize` has never been called.
    Uninitialized,
    /// Handshake in progress.
    Connecting,
    /// Connected and ready to send.
    Connected,
    /// Connection lost; the task is retrying.
    Reconnecting {
        /// The current reconnection attempt number (1-indexed).
        attempt: u32,
    },
    /// Closed by the client, or lost without automatic reconnection.
    Closed,
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// Messages from the public API to the connection task.
enum ConnectionCommand {
    /// Write one encoded text frame.
    Send(String),
    /// Send a normal-closure frame and stop the task.
    Close,
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct ActiveConnection {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
    token: String,
}

/// State shared between the supervisor and its connection tasks.
///
/// Lock order is always `active` then `state`. Subscribers are never invoked
/// while either lock is held.
struct Shared {
    active: Mutex<Option<ActiveConnection>>,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            active: Mutex::new(None),
            state: RwLock::new(ConnectionState::Uninitialized),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }

    /// Update the state only if `generation` still owns the session.
    fn set_state_if_current(&self, generation: u64, state: ConnectionState) -> bool {
        let active = self.lock_active();
        if active.as_ref().map(|a| a.generation) != Some(generation) {
            return false;
        }
        self.set_state(state);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_active().as_ref().map(|a| a.generation) == Some(generation)
    }

    /// Called by an exiting task; clears the handle if it is still ours.
    fn finish(&self, generation: u64) {
        let mut active = self.lock_active();
        if active.as_ref().map(|a| a.generation) == Some(generation) {
            *active = None;
            self.set_state(ConnectionState::Closed);
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionSupervisor
// ---------------------------------------------------------------------------

/// Owns the session's single socket and routes its frames to subscribers.
pub struct ConnectionSupervisor {
    options: SessionOptions,
    dispatcher: Arc<EventDispatcher>,
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &redacted(&self.options.socket_url))
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionSupervisor {
    pub fn new(options: SessionOptions, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            options,
            dispatcher,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Start a connection authenticated with `token`.
    ///
    /// A no-op returning `false` if a live connection exists and
    /// `force_reconnect` is not set. With `force_reconnect` the existing
    /// connection is closed first. Returns immediately; the handshake runs on
    /// a spawned task, and its outcome arrives as [`InboundEvent::Connected`]
    /// or [`InboundEvent::Error`].
    ///
    /// Must be called from within a Tokio runtime. Outside one, an error event
    /// is dispatched and `false` is returned.
    pub fn initialize(&self, token: &str, force_reconnect: bool) -> bool {
        let mut active = self.shared.lock_active();

        if let Some(conn) = active.as_ref() {
            if !conn.cmd_tx.is_closed() && !force_reconnect {
                debug!("chat socket already initialized, ignoring initialize");
                return false;
            }
        }

        if let Some(old) = active.take() {
            debug!("closing connection generation {} before reconnect", old.generation);
            let _ = old.cmd_tx.send(ConnectionCommand::Close);
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.set_state(ConnectionState::Closed);
                drop(active);
                error!("cannot start chat socket outside a Tokio runtime: {}", err);
                self.dispatcher.dispatch(&InboundEvent::transport_error(format!(
                    "cannot start connection: {err}"
                )));
                return false;
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *active = Some(ActiveConnection {
            generation,
            cmd_tx,
            token: token.to_string(),
        });
        self.shared.set_state(ConnectionState::Connecting);
        drop(active);

        info!(
            "Connecting to chat socket at {} (generation {})",
            redacted(&self.options.socket_url),
            generation
        );

        handle.spawn(run_connection_task(ConnectionTask {
            generation,
            url: chat_socket_url(&self.options.socket_url, token),
            policy: self.options.reconnect.clone(),
            cmd_rx,
            dispatcher: Arc::clone(&self.dispatcher),
            shared: Arc::clone(&self.shared),
        }));

        true
    }

    /// Encode `action` and hand it to the socket.
    ///
    /// Nothing is queued while disconnected: the frame is dropped and
    /// [`Error::NotConnected`] is returned. Callers wanting fire-and-forget
    /// semantics may ignore the result.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if there is no connected socket.
    /// - [`Error::Json`] if the action cannot be serialized.
    pub fn send(&self, action: &OutboundAction) -> Result<()> {
        let text = encode_action(action)?;

        let active = self.shared.lock_active();
        let Some(conn) = active.as_ref() else {
            debug!("dropping `{}` action: session not initialized", action.name());
            return Err(Error::NotConnected);
        };
        if self.shared.state() != ConnectionState::Connected {
            debug!("dropping `{}` action: socket not connected", action.name());
            return Err(Error::NotConnected);
        }

        conn.cmd_tx
            .send(ConnectionCommand::Send(text))
            .map_err(|_| Error::NotConnected)?;
        trace!("queued `{}` action", action.name());
        Ok(())
    }

    /// Close the socket with a normal-closure frame and clear the handle.
    ///
    /// A later [`initialize`](Self::initialize) opens a fresh connection.
    pub fn close(&self) {
        let mut active = self.shared.lock_active();
        if let Some(conn) = active.take() {
            info!("Closing chat socket (generation {})", conn.generation);
            let _ = conn.cmd_tx.send(ConnectionCommand::Close);
            self.shared.set_state(ConnectionState::Closed);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The token of the current connection, if one is active.
    pub fn token(&self) -> Option<String> {
        self.shared.lock_active().as_ref().map(|a| a.token.clone())
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

struct ConnectionTask {
    generation: u64,
    url: Url,
    policy: ReconnectPolicy,
    cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    dispatcher: Arc<EventDispatcher>,
    shared: Arc<Shared>,
}

/// How a single connection's read/write loop ended.
#[derive(Debug, PartialEq)]
enum IoOutcome {
    /// Close command received or the supervisor went away.
    Closed,
    /// Lost unexpectedly.
    Lost(String),
}

/// Entry point for one generation's background task.
async fn run_connection_task(mut task: ConnectionTask) {
    let generation = task.generation;
    let mut attempt: u32 = 0;

    loop {
        match connect_or_close(&task.url, &mut task.cmd_rx).await {
            Ok(None) => {
                debug!("chat socket: closed while connecting");
                break;
            }
            Ok(Some(ws_stream)) => {
                if !task
                    .shared
                    .set_state_if_current(generation, ConnectionState::Connected)
                {
                    let (mut sink, _) = ws_stream.split();
                    send_close(&mut sink).await;
                    break;
                }
                info!("Chat socket connected (generation {})", generation);
                attempt = 0;
                task.dispatcher.dispatch(&InboundEvent::Connected);

                match run_io_loop(ws_stream, &mut task.cmd_rx, &task.dispatcher).await {
                    IoOutcome::Closed => break,
                    IoOutcome::Lost(reason) => {
                        warn!("chat socket: connection lost: {}", reason);
                        task.dispatcher
                            .dispatch(&InboundEvent::transport_error(reason));
                    }
                }
            }
            Err(err) => {
                warn!("chat socket: {}", err);
                task.dispatcher
                    .dispatch(&InboundEvent::transport_error(err.to_string()));
            }
        }

        if !task.policy.enabled {
            break;
        }

        attempt += 1;
        if attempt > task.policy.max_attempts {
            error!(
                "chat socket: exceeded {} reconnection attempts, giving up",
                task.policy.max_attempts
            );
            break;
        }

        if !task
            .shared
            .set_state_if_current(generation, ConnectionState::Reconnecting { attempt })
        {
            break;
        }

        let backoff = task.policy.backoff(attempt);
        warn!(
            "chat socket: retrying in {:?} (attempt {}/{})",
            backoff, attempt, task.policy.max_attempts
        );
        if !wait_unless_closed(backoff, &mut task.cmd_rx).await {
            break;
        }
        if !task.shared.is_current(generation) {
            break;
        }
    }

    task.shared.finish(generation);
    debug!("chat socket task (generation {}) exiting", generation);
}

/// Connect to `url`, giving up early if a Close command arrives.
///
/// Returns `Ok(None)` when the attempt was abandoned.
async fn connect_or_close(
    url: &Url,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
) -> Result<Option<WsStream>> {
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => {
                let (ws_stream, _response) = result.map_err(|err| {
                    Error::transport(format!("failed to connect to {}: {err}", redacted(url)))
                })?;
                return Ok(Some(ws_stream));
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Send(_)) => {
                    debug!("chat socket: dropping frame sent while connecting");
                }
                Some(ConnectionCommand::Close) | None => return Ok(None),
            }
        }
    }
}

/// Sleep for `delay`. Returns `false` if a Close command arrived meanwhile.
async fn wait_unless_closed(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Send(_)) => {
                    debug!("chat socket: dropping frame sent while reconnecting");
                }
                Some(ConnectionCommand::Close) | None => return false,
            }
        }
    }
}

/// Run one connection's read/write select loop.
async fn run_io_loop(
    ws_stream: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
    dispatcher: &EventDispatcher,
) -> IoOutcome {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            // ── Incoming frame ──────────────────────────────────────────
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_ws_text(text.as_str(), dispatcher);
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = match frame {
                            Some(f) if !f.reason.is_empty() => {
                                format!("server closed the connection ({}): {}", f.code, f.reason)
                            }
                            Some(f) => format!("server closed the connection ({})", f.code),
                            None => "server closed the connection".to_string(),
                        };
                        return IoOutcome::Lost(reason);
                    }
                    Some(Ok(_)) => {
                        // Ping, Pong and Binary frames are ignored
                    }
                    Some(Err(err)) => {
                        return IoOutcome::Lost(format!("read error: {err}"));
                    }
                    None => {
                        return IoOutcome::Lost("connection ended".to_string());
                    }
                }
            }

            // ── Outgoing command ────────────────────────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::Send(text)) => {
                        if let Err(err) = ws_sink.send(WsMessage::Text(text.into())).await {
                            return IoOutcome::Lost(format!("write error: {err}"));
                        }
                    }
                    Some(ConnectionCommand::Close) | None => {
                        send_close(&mut ws_sink).await;
                        return IoOutcome::Closed;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Decode an inbound text frame and dispatch it. Malformed frames are skipped.
fn handle_ws_text(text: &str, dispatcher: &EventDispatcher) {
    match decode_frame(text) {
        Ok(event) => {
            trace!("chat socket: dispatching `{}` event", event.kind());
            dispatcher.dispatch(&event);
        }
        Err(err) => {
            warn!(
                "chat socket: skipping frame: {} ({})",
                err,
                &text[..floor_char_boundary(text, 120)]
            );
        }
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0)
}

/// Send a normal-closure (1000) frame, ignoring any write errors.
async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: CLOSE_REASON.into(),
    };
    let _ = ws_sink.send(WsMessage::Close(Some(frame))).await;
    let _ = ws_sink.close().await;
}

/// The endpoint without its query string, safe to log.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::assert_err;

    fn options() -> SessionOptions {
        SessionOptions::new(Url::parse("ws://127.0.0.1:9/ws/chat/").unwrap()).unwrap()
    }

    // -- ConnectionState -----------------------------------------------------

    #[test]
    fn test_connection_state_eq() {
        assert_eq!(ConnectionState::Closed, ConnectionState::Closed);
        assert_ne!(ConnectionState::Connected, ConnectionState::Closed);
        assert_ne!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 }
        );
    }

    // -- ReconnectPolicy::backoff --------------------------------------------

    #[test]
    fn test_backoff_doubles_from_initial() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(6), DEFAULT_MAX_BACKOFF);
        assert_eq!(policy.backoff(DEFAULT_MAX_RECONNECT_ATTEMPTS), DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn test_reconnect_disabled_by_default() {
        assert!(!ReconnectPolicy::default().enabled);
    }

    // -- SessionOptions ------------------------------------------------------

    #[test]
    fn test_session_options_rejects_http_scheme() {
        let err = SessionOptions::new(Url::parse("http://host/ws/chat/").unwrap()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_session_options_accepts_wss() {
        assert!(SessionOptions::new(Url::parse("wss://host/ws/chat/").unwrap()).is_ok());
    }

    #[test]
    fn test_redacted_strips_token() {
        let url = chat_socket_url(&Url::parse("ws://host:8000/ws/chat/").unwrap(), "secret");
        let shown = redacted(&url);
        assert_eq!(shown, "ws://host:8000/ws/chat/");
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_floor_char_boundary_respects_multibyte() {
        let text = "ż".repeat(100);
        let end = floor_char_boundary(&text, 121);
        assert!(text.is_char_boundary(end));
        assert!(end <= 121);
    }

    // -- ConnectionSupervisor ------------------------------------------------

    #[test]
    fn test_send_before_initialize_is_not_connected() {
        let supervisor = ConnectionSupervisor::new(options(), Arc::new(EventDispatcher::new()));
        let err = assert_err!(supervisor.send(&OutboundAction::text(chatlink_core::UserId(1), "hi")));
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(supervisor.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn test_close_before_initialize_is_noop() {
        let supervisor = ConnectionSupervisor::new(options(), Arc::new(EventDispatcher::new()));
        supervisor.close();
        assert_eq!(supervisor.state(), ConnectionState::Uninitialized);
        assert!(supervisor.token().is_none());
    }

    #[test]
    fn test_initialize_outside_runtime_dispatches_error() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = errors.clone();
        dispatcher.subscribe(move |event| {
            if matches!(event, InboundEvent::Error { .. }) {
                errors2.fetch_add(1, Ordering::SeqCst);
            }
        });

        let supervisor = ConnectionSupervisor::new(options(), dispatcher);
        assert!(!supervisor.initialize("token", false));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_initialize_sets_connecting_and_keeps_token() {
        let supervisor = ConnectionSupervisor::new(options(), Arc::new(EventDispatcher::new()));
        assert!(supervisor.initialize("abc", false));
        assert_eq!(supervisor.token().as_deref(), Some("abc"));
        assert!(!supervisor.initialize("abc", false));
        supervisor.close();
        assert_eq!(supervisor.state(), ConnectionState::Closed);
        assert!(supervisor.token().is_none());
    }

    #[test]
    fn test_supervisor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionSupervisor>();
    }
}
