//! Test utilities for the app layer
//!
//! [`FakeApi`] is an in-memory [`ChatApi`] that records every call, serves
//! history newest-first like the real server, and can be told to fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use chatlink_core::prelude::*;
use chatlink_core::{
    AuthTokens, Credentials, Friend, FriendRequest, FriendRequests, HistoryPage, HistoryRecord,
    UserId, UserSearchResult,
};
use chatlink_net::ChatApi;

/// The signed-in user of every fake session.
pub const FAKE_ME: UserId = UserId(1);

#[derive(Default)]
struct FakeState {
    friends: Vec<Friend>,
    received: Vec<FriendRequest>,
    sent: Vec<FriendRequest>,
    users: Vec<UserSearchResult>,
    /// Per peer, oldest first.
    history: HashMap<UserId, Vec<HistoryRecord>>,
    next_record_id: i64,
    issued: u32,
    reject_logins: bool,
    fail_next: Option<Error>,
    calls: Vec<String>,
}

/// In-memory [`ChatApi`].
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `call` and return the queued failure, if any.
    fn begin(&self, call: impl Into<String>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call.into());
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: Error) {
        self.state().fail_next = Some(err);
    }

    pub fn reject_logins(&self, reject: bool) {
        self.state().reject_logins = reject;
    }

    pub fn add_friend(&self, id: i64, username: &str) {
        self.state().friends.push(Friend {
            id: UserId(id),
            username: Some(username.to_string()),
            last_message: None,
            has_new_message: false,
            timestamp: None,
        });
    }

    pub fn add_received_request(&self, id: i64, from: &str) {
        self.state().received.push(FriendRequest {
            id,
            from_user: Some(from.to_string()),
            friend: Some(from.to_string()),
            status: Some("pending".to_string()),
        });
    }

    pub fn add_user(&self, id: i64, username: &str) {
        self.state().users.push(UserSearchResult {
            id: UserId(id),
            username: username.to_string(),
            request_sent: false,
            request_received: false,
        });
    }

    /// Store a message in the history shared with `peer`.
    ///
    /// Timestamps increase by one second per stored record.
    pub fn push_history(&self, peer: UserId, sender: UserId, text: &str) -> HistoryRecord {
        self.insert_record(peer, sender, text, None)
    }

    /// Store a message from [`FAKE_ME`] stamped with the current time, as the
    /// server does when it persists a message the client just sent.
    pub fn store_sent(&self, peer: UserId, text: &str) -> HistoryRecord {
        self.insert_record(peer, FAKE_ME, text, Some(Utc::now()))
    }

    fn insert_record(
        &self,
        peer: UserId,
        sender: UserId,
        text: &str,
        at: Option<DateTime<Utc>>,
    ) -> HistoryRecord {
        let mut state = self.state();
        state.next_record_id += 1;
        let id = state.next_record_id;
        let record = HistoryRecord {
            id,
            sender,
            recipient: if sender == peer { FAKE_ME } else { peer },
            content: text.to_string(),
            timestamp: at.unwrap_or_else(|| history_epoch() + Duration::seconds(id)),
            is_read: false,
            file: None,
            file_type: None,
        };
        state.history.entry(peer).or_default().push(record.clone());
        record
    }

    /// Store `count` messages from `peer`, texts `m1..=mN`.
    pub fn seed_history(&self, peer: UserId, count: usize) {
        for n in 1..=count {
            self.push_history(peer, peer, &format!("m{n}"));
        }
    }

    fn issue_tokens(&self) -> AuthTokens {
        let mut state = self.state();
        state.issued += 1;
        AuthTokens {
            access: format!("access-{}", state.issued),
            refresh: format!("refresh-{}", state.issued),
            user_id: Some(FAKE_ME),
        }
    }
}

/// Timestamp of record id 0.
pub fn history_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_746_100_800, 0).unwrap_or_default()
}

impl ChatApi for FakeApi {
    async fn register(&self, credentials: &Credentials) -> Result<()> {
        self.begin(format!("register:{}", credentials.username))
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthTokens> {
        self.begin(format!("login:{}", credentials.username))?;
        if self.state().reject_logins {
            return Err(Error::api(401, "Invalid credentials"));
        }
        Ok(self.issue_tokens())
    }

    async fn refresh_token(&self, refresh: &str) -> Result<AuthTokens> {
        self.begin(format!("refresh:{refresh}"))?;
        let mut tokens = self.issue_tokens();
        tokens.user_id = None;
        Ok(tokens)
    }

    async fn friends(&self) -> Result<Vec<Friend>> {
        self.begin("friends")?;
        Ok(self.state().friends.clone())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchResult>> {
        self.begin(format!("search:{query}"))?;
        let needle = query.to_lowercase();
        Ok(self
            .state()
            .users
            .iter()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn send_friend_request(&self, to: UserId) -> Result<()> {
        self.begin(format!("send_friend_request:{to}"))?;
        let mut state = self.state();
        let id = 1000 + state.sent.len() as i64;
        state.sent.push(FriendRequest {
            id,
            from_user: None,
            friend: Some(to.to_string()),
            status: Some("pending".to_string()),
        });
        Ok(())
    }

    async fn friend_requests(&self) -> Result<FriendRequests> {
        self.begin("friend_requests")?;
        let state = self.state();
        Ok(FriendRequests {
            received: state.received.clone(),
            sent: state.sent.clone(),
        })
    }

    async fn accept_request(&self, request_id: i64) -> Result<()> {
        self.begin(format!("accept_request:{request_id}"))?;
        let mut state = self.state();
        let Some(pos) = state.received.iter().position(|r| r.id == request_id) else {
            return Err(Error::api(404, "Nie znaleziono zaproszenia."));
        };
        let request = state.received.remove(pos);
        state.friends.push(Friend {
            id: UserId(request_id),
            username: request.from_user,
            last_message: None,
            has_new_message: false,
            timestamp: None,
        });
        Ok(())
    }

    async fn reject_request(&self, request_id: i64) -> Result<()> {
        self.begin(format!("reject_request:{request_id}"))?;
        self.state().received.retain(|r| r.id != request_id);
        Ok(())
    }

    async fn remove_friend(&self, friend: UserId) -> Result<()> {
        self.begin(format!("remove_friend:{friend}"))?;
        self.state().friends.retain(|f| f.id != friend);
        Ok(())
    }

    async fn chat_history(
        &self,
        peer: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<HistoryPage> {
        self.begin(format!("chat_history:{peer}:{offset}:{limit}"))?;
        let state = self.state();
        let data = state
            .history
            .get(&peer)
            .map(|records| {
                records
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let friend_name = state
            .friends
            .iter()
            .find(|f| f.id == peer)
            .and_then(|f| f.username.clone());
        Ok(HistoryPage { data, friend_name })
    }

    async fn livekit_token(&self, room: &str) -> Result<String> {
        self.begin(format!("livekit_token:{room}"))?;
        Ok(format!("lk-{room}"))
    }
}
