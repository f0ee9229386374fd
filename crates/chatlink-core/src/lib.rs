//! # chatlink-core - Core Domain Types
//!
//! Foundation crate for chatlink. Provides domain types, the realtime wire
//! events, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`UserId`] - Server-side user id (peers, senders, friends)
//! - [`ChatMessage`] - Immutable message value with a [`MessageStatus`]
//! - [`Friend`], [`FriendRequests`], [`UserSearchResult`] - Friend records
//! - [`HistoryPage`] - One page of chat history
//!
//! ### Events (`events`)
//! - [`InboundEvent`] - Decoded inbound socket frame (`type` discriminator)
//! - [`OutboundAction`] - Client socket action (`action` discriminator)
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use chatlink_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all chatlink crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{
    CallAnswer, ChatMessageEvent, FriendNotice, InboundEvent, IncomingCall, OutboundAction,
};
pub use types::{
    parse_server_timestamp, Attachment, AuthTokens, ChatMessage, ClientMessageId, Credentials,
    Friend, FriendRequest, FriendRequests, HistoryPage, HistoryRecord, MediaCategory, MessageKey,
    MessageStatus, UserId, UserSearchResult,
};
