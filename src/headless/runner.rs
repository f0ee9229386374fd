//! Headless mode runner - session event loop without a UI
//!
//! Signs in, binds the session, then multiplexes three inputs: inbound socket
//! events (through the reconciler), stdin commands, and Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use chatlink_app::config::Settings;
use chatlink_app::{AuthState, ChatReconciler, FileTokenStore, LifecycleBinder};
use chatlink_core::prelude::*;
use chatlink_core::{Credentials, InboundEvent, UserId};
use chatlink_net::{HttpChatApi, Session, TokenCell};

use super::command::HeadlessCommand;
use super::HeadlessEvent;

type Binder = LifecycleBinder<HttpChatApi, FileTokenStore>;

/// Inputs for [`run_headless`].
#[derive(Debug)]
pub struct HeadlessOptions {
    pub settings: Settings,
    /// Where the session file is stored.
    pub config_dir: PathBuf,
    /// Explicit login; without it the stored session is used.
    pub credentials: Option<Credentials>,
}

/// Run in headless mode - output JSON events on stdout
pub async fn run_headless(options: HeadlessOptions) -> Result<()> {
    let HeadlessOptions {
        settings,
        config_dir,
        credentials,
    } = options;

    info!("═══════════════════════════════════════════════════════");
    info!("chatlink starting in HEADLESS mode");
    info!("Server: {}:{}", settings.server.host, settings.server.port);
    info!("═══════════════════════════════════════════════════════");

    let access = TokenCell::new();
    let api = HttpChatApi::new(settings.api_url()?, access.clone())
        .context("invalid [server] settings")?;
    let session = Session::new(
        settings
            .session_options()
            .context("invalid [server] settings")?,
    );
    let store = FileTokenStore::in_dir(&config_dir);
    let binder = Arc::new(LifecycleBinder::new(session.clone(), api, access, store));

    let Some(me) = sign_in(&binder, credentials.as_ref(), settings.auth.remember_me).await else {
        return Ok(());
    };

    let mut reconciler = ChatReconciler::new(session, me).with_page_size(settings.session.page_size);
    if let Err(e) = reconciler.friends_mut().refresh(binder.api()).await {
        warn!("initial friend fetch failed: {}", e);
        HeadlessEvent::error(format!("friend fetch failed: {e}"), e.is_fatal()).emit();
    }

    let refresh_task = binder.spawn_refresh_loop(settings.auth.refresh_interval());

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    std::thread::spawn(move || spawn_stdin_reader_blocking(cmd_tx));

    let result = headless_event_loop(&binder, &mut reconciler, cmd_rx).await;

    refresh_task.abort();
    binder.on_background();

    info!("chatlink headless mode exiting");
    result
}

/// Log in explicitly or silently. Returns the signed-in user id.
async fn sign_in(
    binder: &Binder,
    credentials: Option<&Credentials>,
    remember: bool,
) -> Option<UserId> {
    let state = match credentials {
        Some(credentials) => match binder.login(credentials, remember).await {
            Ok(state) => state,
            Err(e) => {
                error!("login failed: {}", e);
                HeadlessEvent::error(format!("login failed: {e}"), true).emit();
                AuthState::SignedOut
            }
        },
        None => binder.on_app_start().await,
    };

    match state {
        AuthState::SignedIn { user_id: Some(id) } => {
            HeadlessEvent::signed_in(Some(id)).emit();
            Some(id)
        }
        AuthState::SignedIn { user_id: None } => {
            error!("server did not report the signed-in user id");
            HeadlessEvent::error("user id unknown, log in again".to_string(), true).emit();
            binder.on_logout();
            None
        }
        AuthState::SignedOut => {
            HeadlessEvent::signed_out().emit();
            None
        }
    }
}

/// Main headless event loop
async fn headless_event_loop(
    binder: &Binder,
    reconciler: &mut ChatReconciler,
    mut cmd_rx: mpsc::Receiver<HeadlessCommand>,
) -> Result<()> {
    loop {
        tokio::select! {
            event = reconciler.next_event() => {
                let Some(event) = event else {
                    info!("event channel closed");
                    break;
                };
                HeadlessEvent::from_inbound(&event).emit();
                if matches!(event, InboundEvent::Connected) {
                    match reconciler.resync(binder.api()).await {
                        Ok(true) => emit_open_thread(reconciler),
                        Ok(false) => {}
                        Err(e) => report(&e),
                    }
                }
            }
            command = cmd_rx.recv() => {
                let Some(command) = command else {
                    info!("stdin closed");
                    break;
                };
                if command == HeadlessCommand::Quit {
                    info!("Quit requested");
                    break;
                }
                if let Err(e) = handle_command(binder, reconciler, command).await {
                    report(&e);
                    if e.is_fatal() {
                        binder.on_logout();
                        HeadlessEvent::signed_out().emit();
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(
    binder: &Binder,
    reconciler: &mut ChatReconciler,
    command: HeadlessCommand,
) -> Result<()> {
    let api = binder.api();
    match command {
        HeadlessCommand::Open(peer) => {
            reconciler.select_peer(api, peer).await?;
            emit_open_thread(reconciler);
        }
        HeadlessCommand::Send { peer, text } => {
            let id = reconciler.send_message(peer, &text)?;
            HeadlessEvent::sent(peer, id.value()).emit();
        }
        HeadlessCommand::History => emit_open_thread(reconciler),
        HeadlessCommand::More => {
            let peer = open_peer(reconciler)?;
            reconciler.load_more(api, peer).await?;
            emit_open_thread(reconciler);
        }
        HeadlessCommand::Retry => {
            let peer = open_peer(reconciler)?;
            let resent = reconciler.retry_failed(peer);
            info!("resent {} failed message(s) to {}", resent, peer);
            emit_open_thread(reconciler);
        }
        HeadlessCommand::Friends => {
            reconciler.friends_mut().refresh(api).await?;
            emit_friends(reconciler);
        }
        HeadlessCommand::Search(query) => {
            let users = reconciler.friends().search(api, &query).await?;
            for user in users {
                HeadlessEvent::Signal {
                    kind: "search_result".to_string(),
                    payload: serde_json::to_value(&user).ok(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                }
                .emit();
            }
        }
        HeadlessCommand::Accept(id) => {
            reconciler.friends_mut().accept(api, id).await?;
            emit_friends(reconciler);
        }
        HeadlessCommand::Reject(id) => {
            reconciler.friends_mut().reject(api, id).await?;
            emit_friends(reconciler);
        }
        HeadlessCommand::Add(user) => {
            reconciler.friends_mut().send_request(api, user).await?;
            emit_friends(reconciler);
        }
        HeadlessCommand::Quit => {}
    }
    Ok(())
}

fn open_peer(reconciler: &ChatReconciler) -> Result<UserId> {
    reconciler
        .open_peer()
        .ok_or_else(|| Error::config("no open thread, use `open <peer>` first"))
}

fn emit_open_thread(reconciler: &ChatReconciler) {
    let Some(peer) = reconciler.open_peer() else {
        return;
    };
    if let Some(thread) = reconciler.thread(peer) {
        HeadlessEvent::history(peer, thread.can_load_more(), thread.messages()).emit();
    }
}

fn emit_friends(reconciler: &ChatReconciler) {
    let friends = reconciler.friends();
    HeadlessEvent::friends(friends.friends(), friends.received(), friends.sent()).emit();
}

fn report(e: &Error) {
    warn!("command failed: {}", e);
    HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
}

/// Read stdin lines and forward parsed commands (blocking; runs on its own thread)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<HeadlessCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match HeadlessCommand::parse(&line) {
            Ok(Some(command)) => {
                let quit = command == HeadlessCommand::Quit;
                if cmd_tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => {
                warn!("Unknown stdin command: {}", line.trim());
                HeadlessEvent::error(message, false).emit();
            }
        }
    }

    info!("Stdin reader exiting");
}
