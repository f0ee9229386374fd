//! REST API client.
//!
//! [`ChatApi`] is the seam between the session core and the HTTP backend:
//! [`HttpChatApi`] talks to the server with reqwest, tests substitute an
//! in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use chatlink_core::prelude::*;
use chatlink_core::{
    AuthTokens, Credentials, Friend, FriendRequests, HistoryPage, UserId, UserSearchResult,
};

/// Timeout applied to every REST request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// TokenCell
// ---------------------------------------------------------------------------

/// Shared slot holding the current access token.
///
/// The lifecycle binder writes it after login/refresh; the API client reads
/// it on every authenticated call.
#[derive(Clone, Default)]
pub struct TokenCell(Arc<RwLock<Option<String>>>);

impl std::fmt::Debug for TokenCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TokenCell")
            .field(&self.get().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

// ---------------------------------------------------------------------------
// ChatApi
// ---------------------------------------------------------------------------

/// REST operations consumed by the session core.
#[trait_variant::make(ChatApi: Send)]
pub trait LocalChatApi {
    /// Create an account.
    async fn register(&self, credentials: &Credentials) -> Result<()>;

    /// Exchange credentials for a token pair.
    async fn login(&self, credentials: &Credentials) -> Result<AuthTokens>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_token(&self, refresh: &str) -> Result<AuthTokens>;

    async fn friends(&self) -> Result<Vec<Friend>>;

    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchResult>>;

    async fn send_friend_request(&self, to: UserId) -> Result<()>;

    /// Pending requests, received and sent.
    async fn friend_requests(&self) -> Result<FriendRequests>;

    async fn accept_request(&self, request_id: i64) -> Result<()>;

    async fn reject_request(&self, request_id: i64) -> Result<()>;

    async fn remove_friend(&self, friend: UserId) -> Result<()>;

    /// One page of history with `peer`, newest first.
    async fn chat_history(&self, peer: UserId, offset: usize, limit: usize)
        -> Result<HistoryPage>;

    /// Media-room token for a call.
    async fn livekit_token(&self, room: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HttpChatApi
// ---------------------------------------------------------------------------

/// reqwest-backed [`ChatApi`].
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base: Url,
    tokens: TokenCell,
}

impl HttpChatApi {
    /// `base` is the API root, e.g. `http://host:8000/api/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a non-HTTP base URL and [`Error::Http`]
    /// if the HTTP client cannot be built.
    pub fn new(base: Url, tokens: TokenCell) -> Result<Self> {
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "API URL must use http:// or https://, got {}",
                base
            )));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenCell {
        &self.tokens
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::config(format!("invalid API path {path}: {e}")))
    }

    /// Attach the bearer token, failing if none is stored.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.get().ok_or(Error::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn execute(&self, request: RequestBuilder, reject_is_fatal: bool) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(e.without_url().to_string()))?;
        check_status(response, reject_is_fatal).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url.path());
        let request = self.authorized(self.client.get(url))?;
        let response = self.execute(request, true).await?;
        decode_body(response).await
    }
}

impl ChatApi for HttpChatApi {
    async fn register(&self, credentials: &Credentials) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint("register/")?)
            .json(&credentials_body(credentials));
        self.execute(request, false).await?;
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthTokens> {
        let request = self
            .client
            .post(self.endpoint("login/")?)
            .json(&credentials_body(credentials));
        let response = self.execute(request, false).await?;
        decode_body(response).await
    }

    async fn refresh_token(&self, refresh: &str) -> Result<AuthTokens> {
        let request = self
            .client
            .post(self.endpoint("token/refresh/")?)
            .json(&json!({ "refresh": refresh }));
        let response = self.execute(request, true).await?;
        decode_body(response).await
    }

    async fn friends(&self) -> Result<Vec<Friend>> {
        self.get_json(self.endpoint("friends/")?).await
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchResult>> {
        let mut url = self.endpoint("users/search/")?;
        url.query_pairs_mut().append_pair("q", query);
        self.get_json(url).await
    }

    async fn send_friend_request(&self, to: UserId) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint("friends/request/")?)
            .json(&json!({ "to_user": to }));
        self.execute(self.authorized(request)?, true).await?;
        Ok(())
    }

    async fn friend_requests(&self) -> Result<FriendRequests> {
        self.get_json(self.endpoint("friends/requests/")?).await
    }

    async fn accept_request(&self, request_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("friends/request/{request_id}/"))?;
        let request = self.authorized(self.client.patch(url))?;
        self.execute(request, true).await?;
        Ok(())
    }

    async fn reject_request(&self, request_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("friends/request/{request_id}/"))?;
        let request = self.authorized(self.client.delete(url))?;
        self.execute(request, true).await?;
        Ok(())
    }

    async fn remove_friend(&self, friend: UserId) -> Result<()> {
        let url = self.endpoint(&format!("friends/remove/{friend}/"))?;
        let request = self.authorized(self.client.delete(url))?;
        self.execute(request, true).await?;
        Ok(())
    }

    async fn chat_history(
        &self,
        peer: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<HistoryPage> {
        let mut url = self.endpoint("chat/history/")?;
        url.query_pairs_mut()
            .append_pair("user_id", &peer.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    async fn livekit_token(&self, room: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let mut url = self.endpoint("livekit-token/")?;
        url.query_pairs_mut().append_pair("room", room);
        let response: TokenResponse = self.get_json(url).await?;
        Ok(response.token)
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn credentials_body(credentials: &Credentials) -> Value {
    json!({
        "username": credentials.username,
        "password": credentials.password,
    })
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Map a non-success status to an error.
///
/// With `reject_is_fatal`, 401 becomes [`Error::Unauthorized`]; it is never
/// retried here.
async fn check_status(response: Response, reject_is_fatal: bool) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if reject_is_fatal && status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    let message = server_error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    Err(Error::api(status.as_u16(), message))
}

/// Extract the server's human-readable error from a JSON body.
fn server_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let path = response.url().path().to_string();
    response
        .json::<T>()
        .await
        .map_err(|e| Error::protocol(format!("unexpected response from {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::{server_error_message, ChatApi, HttpChatApi, TokenCell};
    use chatlink_core::prelude::*;
    use chatlink_core::{Credentials, UserId};
    use url::Url;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        let base = Url::parse(&format!("http://{addr}/api/")).unwrap();
        (base, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn api(base: Url, token: Option<&str>) -> HttpChatApi {
        let tokens = TokenCell::new();
        if let Some(token) = token {
            tokens.set(token);
        }
        HttpChatApi::new(base, tokens).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "ala".into(),
            password: "kot".into(),
        }
    }

    #[tokio::test]
    async fn test_login_parses_tokens_without_bearer() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"access":"a1","refresh":"r1","userId":7}"#,
        )
        .await;
        let tokens = api(base, None).login(&credentials()).await.unwrap();
        assert_eq!(tokens.access, "a1");
        assert_eq!(tokens.refresh, "r1");
        assert_eq!(tokens.user_id, Some(UserId(7)));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/login/ "));
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
        assert!(request.contains(r#""username":"ala""#));
    }

    #[tokio::test]
    async fn test_login_rejection_is_api_error_with_server_message() {
        let (base, _server) = serve_once(
            "401 Unauthorized",
            r#"{"error":"Nieprawidłowe dane logowania"}"#,
        )
        .await;
        let err = api(base, None).login(&credentials()).await.unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Nieprawidłowe dane logowania");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_friends_sends_bearer_token() {
        let (base, server) = serve_once(
            "200 OK",
            r#"[{"id":2,"username":"bob","lastMessage":"hej","hasNewMessage":true,"timestamp":null}]"#,
        )
        .await;
        let friends = api(base, Some("tok")).friends().await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, UserId(2));
        assert!(friends[0].has_new_message);

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/friends/ "));
        assert!(request.contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn test_authenticated_call_without_token_fails_fast() {
        let base = Url::parse("http://127.0.0.1:9/api/").unwrap();
        let err = api(base, None).friends().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let (base, _server) = serve_once(
            "401 Unauthorized",
            r#"{"detail":"Given token not valid for any token type"}"#,
        )
        .await;
        let err = api(base, Some("stale")).friend_requests().await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_application_error_carries_detail() {
        let (base, _server) =
            serve_once("404 Not Found", r#"{"detail":"Nie znaleziono zaproszenia."}"#).await;
        let err = api(base, Some("tok")).accept_request(12).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, ref message } if message == "Nie znaleziono zaproszenia."));
    }

    #[tokio::test]
    async fn test_accept_request_uses_patch() {
        let (base, server) = serve_once("200 OK", r#"{"detail":"ok"}"#).await;
        api(base, Some("tok")).accept_request(12).await.unwrap();
        assert!(server
            .await
            .unwrap()
            .starts_with("PATCH /api/friends/request/12/ "));
    }

    #[tokio::test]
    async fn test_remove_friend_uses_delete() {
        let (base, server) = serve_once("204 No Content", "").await;
        api(base, Some("tok")).remove_friend(UserId(5)).await.unwrap();
        assert!(server
            .await
            .unwrap()
            .starts_with("DELETE /api/friends/remove/5/ "));
    }

    #[tokio::test]
    async fn test_chat_history_query_and_page() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"data":[{"id":9,"sender":2,"recipient":1,"content":"yo","timestamp":"2025-05-01 12:00:00+00:00","is_read":false}],"friendName":"bob"}"#,
        )
        .await;
        let page = api(base, Some("tok"))
            .chat_history(UserId(2), 50, 50)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.friend_name.as_deref(), Some("bob"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/chat/history/?user_id=2&offset=50&limit=50 "));
    }

    #[tokio::test]
    async fn test_send_friend_request_body() {
        let (base, server) = serve_once("201 Created", r#"{"id":3}"#).await;
        api(base, Some("tok"))
            .send_friend_request(UserId(8))
            .await
            .unwrap();
        assert!(server.await.unwrap().contains(r#"{"to_user":8}"#));
    }

    #[tokio::test]
    async fn test_livekit_token() {
        let (base, server) = serve_once("200 OK", r#"{"token":"lk"}"#).await;
        let token = api(base, Some("tok")).livekit_token("4").await.unwrap();
        assert_eq!(token, "lk");
        assert!(server
            .await
            .unwrap()
            .starts_with("GET /api/livekit-token/?room=4 "));
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let (base, _server) = serve_once("200 OK", r#"{"unexpected":true}"#).await;
        let err = api(base, Some("tok")).livekit_token("1").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_server_error_message_precedence() {
        assert_eq!(
            server_error_message(r#"{"detail":"d","error":"e"}"#).as_deref(),
            Some("e")
        );
        assert_eq!(server_error_message(r#"{"message":"m"}"#).as_deref(), Some("m"));
        assert_eq!(server_error_message("<html>"), None);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let api = HttpChatApi::new(Url::parse("http://h:8000/api").unwrap(), TokenCell::new())
            .unwrap();
        assert_eq!(api.base_url().as_str(), "http://h:8000/api/");
        assert_eq!(
            api.endpoint("friends/").unwrap().as_str(),
            "http://h:8000/api/friends/"
        );
    }

    #[test]
    fn test_rejects_ws_base() {
        let err = HttpChatApi::new(Url::parse("ws://h/api/").unwrap(), TokenCell::new())
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_token_cell_debug_redacts() {
        let cell = TokenCell::new();
        cell.set("secret");
        assert!(!format!("{cell:?}").contains("secret"));
        cell.clear();
        assert!(cell.get().is_none());
    }
}
