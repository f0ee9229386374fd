//! Lifecycle binder
//!
//! Maps application lifecycle transitions onto the session: sign-in opens the
//! socket with the fresh access token, backgrounding closes it, foregrounding
//! reopens it, and logout closes it and forgets the stored tokens.
//!
//! The binder is the only component that calls [`Session::initialize`] and
//! [`Session::close`] on behalf of the user.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use chatlink_core::prelude::*;
use chatlink_core::{AuthTokens, Credentials, UserId};
use chatlink_net::{ChatApi, Session, TokenCell};

use crate::tokens::{StoredSession, TokenStore};

/// Outcome of a sign-in attempt, as the UI consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Tokens are stored and the socket was (re)initialized with them.
    SignedIn { user_id: Option<UserId> },
    /// The login screen must be shown.
    SignedOut,
}

#[derive(Debug, Default)]
struct BinderState {
    refresh: Option<String>,
    user_id: Option<UserId>,
    /// Kept only when the user asked to be remembered.
    credentials: Option<Credentials>,
    /// True between sign-in/foreground and background/logout.
    foreground: bool,
}

/// Connects sign-in state and app lifecycle to one [`Session`].
pub struct LifecycleBinder<A, S> {
    session: Session,
    api: A,
    access: TokenCell,
    store: S,
    state: Mutex<BinderState>,
}

impl<A, S> std::fmt::Debug for LifecycleBinder<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBinder")
            .field("session", &self.session)
            .field("access", &self.access)
            .finish()
    }
}

impl<A: ChatApi, S: TokenStore> LifecycleBinder<A, S> {
    /// `access` must be the cell the API client reads its bearer token from.
    pub fn new(session: Session, api: A, access: TokenCell, store: S) -> Self {
        Self {
            session,
            api,
            access,
            store,
            state: Mutex::new(BinderState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BinderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.lock().user_id
    }

    pub fn is_signed_in(&self) -> bool {
        self.access.get().is_some()
    }

    // ─────────────────────────────────────────────────────────
    // Sign-in
    // ─────────────────────────────────────────────────────────

    /// Log in with `credentials`, persist the tokens, and open the socket.
    ///
    /// With `remember` the credentials are stored for silent login.
    pub async fn login(&self, credentials: &Credentials, remember: bool) -> Result<AuthState> {
        let tokens = self.api.login(credentials).await?;
        info!("signed in as {}", credentials.username);
        let remembered = remember.then(|| credentials.clone());
        Ok(self.adopt(tokens, remembered))
    }

    /// Silent login at startup.
    ///
    /// Uses the stored credentials if any, otherwise the stored refresh
    /// token. Any failure leaves the session uninitialized and returns
    /// [`AuthState::SignedOut`].
    pub async fn on_app_start(&self) -> AuthState {
        let Some(stored) = self.store.load() else {
            debug!("no stored session, login required");
            return AuthState::SignedOut;
        };

        if let Some(credentials) = stored.credentials.clone() {
            return match self.api.login(&credentials).await {
                Ok(tokens) => {
                    info!("silent login as {}", credentials.username);
                    self.adopt(tokens, Some(credentials))
                }
                Err(e) => {
                    warn!("silent login failed: {}", e);
                    if e.is_fatal() || matches!(e, Error::Api { status: 400..=403, .. }) {
                        self.forget();
                    }
                    AuthState::SignedOut
                }
            };
        }

        match self.api.refresh_token(&stored.tokens.refresh).await {
            Ok(mut tokens) => {
                tokens.user_id = tokens.user_id.or(stored.tokens.user_id);
                self.adopt(tokens, None)
            }
            Err(e) => {
                warn!("stored refresh token rejected: {}", e);
                self.forget();
                AuthState::SignedOut
            }
        }
    }

    /// Store `tokens` and re-initialize the socket with the new access token.
    fn adopt(&self, tokens: AuthTokens, credentials: Option<Credentials>) -> AuthState {
        self.access.set(tokens.access.clone());
        {
            let mut state = self.lock();
            state.refresh = Some(tokens.refresh.clone());
            state.user_id = tokens.user_id.or(state.user_id);
            state.credentials = credentials.clone();
            state.foreground = true;
        }

        let stored = StoredSession {
            tokens: tokens.clone(),
            credentials,
        };
        if let Err(e) = self.store.save(&stored) {
            warn!("could not persist session: {}", e);
        }

        self.session.initialize(&tokens.access, true);
        AuthState::SignedIn {
            user_id: self.user_id(),
        }
    }

    fn forget(&self) {
        self.access.clear();
        *self.lock() = BinderState::default();
        if let Err(e) = self.store.clear() {
            warn!("could not clear stored session: {}", e);
        }
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle transitions
    // ─────────────────────────────────────────────────────────

    /// App returned to the foreground: open a fresh socket.
    ///
    /// Consumers learn of the new connection through
    /// [`InboundEvent::Connected`](chatlink_core::InboundEvent::Connected) and
    /// refetch what they show. Returns `false` when signed out.
    pub fn on_foreground(&self) -> bool {
        let Some(token) = self.access.get() else {
            debug!("foreground while signed out");
            return false;
        };
        self.lock().foreground = true;
        self.session.initialize(&token, true)
    }

    /// App moved to the background or is terminating.
    pub fn on_background(&self) {
        self.lock().foreground = false;
        self.session.close();
    }

    /// Close the socket and forget every stored token.
    pub fn on_logout(&self) {
        info!("logging out");
        self.session.close();
        self.forget();
    }

    // ─────────────────────────────────────────────────────────
    // Token refresh
    // ─────────────────────────────────────────────────────────

    /// Exchange the refresh token for a new pair.
    ///
    /// While in the foreground the socket is re-initialized with the new
    /// access token; in the background it stays closed.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] without a refresh token, or the REST error.
    pub async fn refresh_tokens(&self) -> Result<()> {
        let Some(refresh) = self.lock().refresh.clone() else {
            return Err(Error::NotAuthenticated);
        };

        let tokens = self.api.refresh_token(&refresh).await?;
        self.access.set(tokens.access.clone());

        let (foreground, stored) = {
            let mut state = self.lock();
            state.refresh = Some(tokens.refresh.clone());
            let stored = StoredSession {
                tokens: AuthTokens {
                    user_id: tokens.user_id.or(state.user_id),
                    ..tokens.clone()
                },
                credentials: state.credentials.clone(),
            };
            (state.foreground, stored)
        };

        if let Err(e) = self.store.save(&stored) {
            warn!("could not persist refreshed tokens: {}", e);
        }
        debug!("access token refreshed");

        if foreground {
            self.session.initialize(&tokens.access, true);
        }
        Ok(())
    }
}

impl<A, S> LifecycleBinder<A, S>
where
    A: ChatApi + Sync + 'static,
    S: TokenStore + 'static,
{
    /// Refresh tokens every `every` until the binder is dropped.
    ///
    /// The first refresh happens one full interval after the call. A failed
    /// refresh is logged and tried again at the next tick.
    pub fn spawn_refresh_loop(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let binder: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(binder) = binder.upgrade() else {
                    debug!("lifecycle binder dropped, stopping token refresh");
                    break;
                };
                if binder.lock().refresh.is_none() {
                    continue;
                }
                if let Err(e) = binder.refresh_tokens().await {
                    warn!("token refresh failed, retrying next tick: {}", e);
                }
            }
        })
    }
}
