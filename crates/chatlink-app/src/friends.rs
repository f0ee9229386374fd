//! Friend list and friend request records
//!
//! Records are never patched from socket events: a relevant event marks the
//! directory stale and the next [`FriendDirectory::refresh_if_stale`] refetches
//! everything. Only the chat preview (last message, unread flag) is updated
//! locally, since the server has no event for it.

use chrono::{DateTime, Utc};

use chatlink_core::prelude::*;
use chatlink_core::{Friend, FriendRequest, UserId, UserSearchResult};
use chatlink_net::ChatApi;

/// Friends plus pending received and sent requests.
#[derive(Debug, Clone, Default)]
pub struct FriendDirectory {
    friends: Vec<Friend>,
    received: Vec<FriendRequest>,
    sent: Vec<FriendRequest>,
    stale: bool,
    loaded: bool,
}

impl FriendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    pub fn friend(&self, id: UserId) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn received(&self) -> &[FriendRequest] {
        &self.received
    }

    pub fn sent(&self) -> &[FriendRequest] {
        &self.sent
    }

    /// True until the first refresh, and after any invalidation.
    pub fn is_stale(&self) -> bool {
        self.stale || !self.loaded
    }

    pub fn invalidate(&mut self) {
        if !self.stale {
            debug!("friend records invalidated");
        }
        self.stale = true;
    }

    /// Refetch friends and pending requests.
    ///
    /// # Errors
    ///
    /// Propagates the first REST error; the directory keeps its old contents
    /// and stays stale.
    pub async fn refresh<A: ChatApi>(&mut self, api: &A) -> Result<()> {
        let friends = api.friends().await?;
        let requests = api.friend_requests().await?;
        self.friends = friends;
        self.received = requests.received;
        self.sent = requests.sent;
        self.stale = false;
        self.loaded = true;
        debug!(
            "friend records refreshed: {} friends, {} received, {} sent",
            self.friends.len(),
            self.received.len(),
            self.sent.len()
        );
        Ok(())
    }

    /// Refresh only when stale. Returns whether a fetch happened.
    pub async fn refresh_if_stale<A: ChatApi>(&mut self, api: &A) -> Result<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        self.refresh(api).await?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────
    // Workflows (each followed by a full refetch)
    // ─────────────────────────────────────────────────────────

    pub async fn search<A: ChatApi>(&self, api: &A, query: &str) -> Result<Vec<UserSearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        api.search_users(query.trim()).await
    }

    pub async fn send_request<A: ChatApi>(&mut self, api: &A, to: UserId) -> Result<()> {
        api.send_friend_request(to).await?;
        info!("friend request sent to {}", to);
        self.refresh(api).await
    }

    pub async fn accept<A: ChatApi>(&mut self, api: &A, request_id: i64) -> Result<()> {
        api.accept_request(request_id).await?;
        info!("friend request {} accepted", request_id);
        self.refresh(api).await
    }

    pub async fn reject<A: ChatApi>(&mut self, api: &A, request_id: i64) -> Result<()> {
        api.reject_request(request_id).await?;
        info!("friend request {} rejected", request_id);
        self.refresh(api).await
    }

    pub async fn remove<A: ChatApi>(&mut self, api: &A, friend: UserId) -> Result<()> {
        api.remove_friend(friend).await?;
        info!("friend {} removed", friend);
        self.refresh(api).await
    }

    // ─────────────────────────────────────────────────────────
    // Chat preview
    // ─────────────────────────────────────────────────────────

    /// Record the latest message exchanged with `peer`.
    ///
    /// Returns `false` if `peer` is not a known friend; the directory is then
    /// marked stale so the next refresh picks the friend up.
    pub fn update_preview(
        &mut self,
        peer: UserId,
        text: &str,
        timestamp: DateTime<Utc>,
        unread: bool,
    ) -> bool {
        match self.friends.iter_mut().find(|f| f.id == peer) {
            Some(friend) => {
                friend.last_message = Some(text.to_string());
                friend.timestamp = Some(timestamp.to_rfc3339());
                friend.has_new_message |= unread;
                true
            }
            None => {
                self.invalidate();
                false
            }
        }
    }

    /// Clear the unread flag, e.g. when the thread is opened.
    pub fn clear_unread(&mut self, peer: UserId) {
        if let Some(friend) = self.friends.iter_mut().find(|f| f.id == peer) {
            friend.has_new_message = false;
        }
    }
}
