//! # chatlink-app - Session State and Lifecycle
//!
//! Everything above the socket: per-peer conversation threads reconciled from
//! history pages, live events and local sends; friend records; the lifecycle
//! binder that opens and closes the session; persisted tokens; configuration.
//!
//! ## Public API
//!
//! ### Session State Reconciler
//! - [`ChatReconciler`] - Per-peer threads, history paging, optimistic sends
//! - [`ConversationThread`] - One peer's ordered, deduplicated messages
//! - [`FriendDirectory`] - Friends and requests, refetched when invalidated
//!
//! ### Lifecycle Binder
//! - [`LifecycleBinder`] - Login, foreground/background, logout, token refresh
//! - [`AuthState`] - Signed in or "show the login screen"
//! - [`TokenStore`], [`FileTokenStore`], [`MemoryTokenStore`] - Persisted tokens
//!
//! ### Configuration
//! - [`config::Settings`] - `config.toml` contents
//! - [`config::load_settings()`] - Load with defaults on any error

pub mod config;
pub mod conversation;
pub mod friends;
pub mod lifecycle;
pub mod reconciler;
pub mod tokens;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use conversation::{ConversationThread, PAGE_SIZE};
pub use friends::FriendDirectory;
pub use lifecycle::{AuthState, LifecycleBinder};
pub use reconciler::ChatReconciler;
pub use tokens::{FileTokenStore, MemoryTokenStore, StoredSession, TokenStore};
