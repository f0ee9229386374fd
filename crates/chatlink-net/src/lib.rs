//! # chatlink-net - Realtime Session and REST Client
//!
//! Owns the single chat socket of a session, fans inbound frames out to
//! subscribers, and wraps the REST endpoints the session core consumes.
//!
//! Depends on [`chatlink_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Session
//! - [`Session`] - Clonable handle shared by every consumer
//! - [`SessionOptions`], [`ReconnectPolicy`] - Endpoint and reconnection settings
//! - [`ConnectionState`] - Current socket state
//!
//! ### Connection Supervisor
//! - [`ConnectionSupervisor`] - Idempotent `initialize`, `send`, `close`
//!
//! ### Event Dispatcher
//! - [`EventDispatcher`] - Snapshot-then-iterate fan-out
//! - [`Subscription`] - Guard that unsubscribes on drop
//!
//! ### Wire Protocol
//! - [`decode_frame()`] - Parse one inbound text frame
//! - [`encode_action()`] - Serialize one outbound action
//! - [`chat_socket_url()`] - Attach the access token to the socket URL
//!
//! ### REST API
//! - [`ChatApi`] - Trait implemented by [`HttpChatApi`] and test fakes
//! - [`TokenCell`] - Shared access-token slot

pub mod api;
pub mod dispatcher;
pub mod protocol;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use api::{ChatApi, HttpChatApi, LocalChatApi, TokenCell};
pub use dispatcher::{EventDispatcher, Subscriber, Subscription, SubscriptionId};
pub use protocol::{chat_socket_url, decode_frame, encode_action};
pub use session::Session;
pub use supervisor::{ConnectionState, ConnectionSupervisor, ReconnectPolicy, SessionOptions};
