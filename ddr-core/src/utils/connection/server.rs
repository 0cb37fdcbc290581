//! WebSocket Server Module
//!
//! This module defines the WebSocket server implementation using the
//! `picoserve` framework. It accepts drive commands as JSON text or binary
//! frames, hands them to the control loop and keeps a small per-client
//! session table.

extern crate alloc;

use alloc::{string::String, vec::Vec};

use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::Duration;
use embedded_io_async::Read;
use hashbrown::HashMap;
use lazy_static::lazy_static;
use picoserve::{
    extract::FromRequest,
    io::embedded_io_async as embedded_aio,
    request::{RequestBody, RequestParts},
    response::{
        ws::{Message, ReadMessageError, SocketRx, SocketTx, WebSocketCallback, WebSocketUpgrade},
        StatusCode,
    },
    url_encoded::deserialize_form,
    Router,
};
use serde::Deserialize;

use crate::utils::{
    controllers::{dispatch, SystemCommand},
    frontend::HTML,
};

/// Sessions idle for longer than this are dropped when a new client connects.
pub const SESSION_TTL_SECS: u64 = 300;

pub struct ServerTimer;
pub struct WebSocket {
    pub session: String,
}
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub last_seen: u64,
    pub commands: u32,
}
pub struct SessionManager;

lazy_static! {
    pub static ref SESSION_STORE: Mutex<CriticalSectionRawMutex, HashMap<String, SessionState>> =
        Mutex::new(HashMap::new());
}

/// Parse a JSON drive command from a text or binary frame.
pub fn parse_command(data: &[u8]) -> Result<SystemCommand, serde_json::Error> {
    serde_json::from_slice::<SystemCommand>(data)
}

/// Manages timeouts for the WebSocket server.
#[allow(unused_qualifications)]
impl picoserve::Timer for ServerTimer {
    type Duration = embassy_time::Duration;
    type TimeoutError = embassy_time::TimeoutError;

    /// Runs a future with a timeout.
    async fn run_with_timeout<F: core::future::Future>(
        &mut self,
        duration: Self::Duration,
        future: F,
    ) -> Result<F::Output, Self::TimeoutError> {
        embassy_time::with_timeout(duration, future).await
    }
}

impl WebSocket {
    /// Parse and forward one frame, returning the reply to send back.
    async fn on_frame(
        &self,
        data: &[u8],
    ) -> &'static str {
        match parse_command(data) {
            Ok(cmd) => {
                dispatch(cmd).await;
                let now = embassy_time::Instant::now().as_secs();
                SessionManager::record_command(&self.session, now).await;
                "ok"
            }
            Err(error) => {
                tracing::error!(?error, "error deserializing SystemCommand");
                "Invalid command format"
            }
        }
    }
}

/// Handles incoming WebSocket connections.
impl WebSocketCallback for WebSocket {
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let mut buffer = [0; 1024];

        tx.send_text("Connected").await?;

        let close_reason = loop {
            match rx.next_message(&mut buffer).await {
                Ok(Message::Pong(_)) => continue,
                Ok(Message::Ping(data)) => tx.send_pong(data).await?,
                Ok(Message::Close(reason)) => {
                    tracing::info!(?reason, session = %self.session, "websocket closed");
                    break None;
                }
                Ok(Message::Text(data)) => {
                    let reply = self.on_frame(data.as_bytes()).await;
                    tx.send_text(reply).await?
                }
                Ok(Message::Binary(data)) => {
                    let reply = self.on_frame(data).await;
                    tx.send_binary(reply.as_bytes()).await?
                }
                Err(error) => {
                    tracing::error!(?error, "websocket error");
                    let code = match error {
                        ReadMessageError::TextIsNotUtf8 => 1007,
                        ReadMessageError::ReservedOpcode(_) => 1003,
                        ReadMessageError::ReadFrameError(_)
                        | ReadMessageError::UnexpectedMessageStart
                        | ReadMessageError::MessageStartsWithContinuation => 1002,
                        ReadMessageError::Io(err) => {
                            SessionManager::remove_session(&self.session).await;
                            return Err(err);
                        }
                    };
                    break Some((code, "Websocket Error"));
                }
            };
        };

        SessionManager::remove_session(&self.session).await;
        tx.close(close_reason).await
    }
}

impl SessionManager {
    /// Creates a new session with the given session ID and timestamp.
    pub async fn create_session(
        session_id: String,
        timestamp: u64,
    ) {
        SESSION_STORE.lock().await.insert(
            session_id,
            SessionState {
                last_seen: timestamp,
                commands: 0,
            },
        );
    }

    /// Retrieves a copy of the session state for the given session ID.
    /// Returns None if the session does not exist.
    pub async fn get_session(session_id: &str) -> Option<SessionState> {
        SESSION_STORE.lock().await.get(session_id).cloned()
    }

    /// Bumps `last_seen` and the command counter of a session.
    /// Returns true if the session was found and updated.
    pub async fn record_command(
        session_id: &str,
        timestamp: u64,
    ) -> bool {
        if let Some(session) = SESSION_STORE.lock().await.get_mut(session_id) {
            session.last_seen = timestamp;
            session.commands = session.commands.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// Removes the session identified by session_id.
    /// Returns true if a session was removed.
    pub async fn remove_session(session_id: &str) -> bool {
        SESSION_STORE.lock().await.remove(session_id).is_some()
    }

    /// Purges sessions whose `last_seen` is older than `threshold`.
    pub async fn purge_stale_sessions(threshold: u64) {
        SESSION_STORE
            .lock()
            .await
            .retain(|_id, session| session.last_seen >= threshold);
    }

    /// Returns a list of active session IDs.
    pub async fn list_sessions() -> Vec<String> {
        SESSION_STORE.lock().await.keys().cloned().collect()
    }
}

/// Creates WS Server
pub async fn run(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    config: Option<&'static picoserve::Config<Duration>>,
) -> ! {
    let default_config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    });

    let config = config.unwrap_or(&default_config);

    let router = Router::new()
        .route(
            "/",
            picoserve::routing::get(|| async {
                picoserve::response::Response::new(StatusCode::OK, HTML)
                    .with_headers([("Content-Type", "text/html; charset=utf-8")])
            }),
        )
        .route(
            "/ws",
            picoserve::routing::get(|params: WsConnectionParams| async move {
                let session_id = params.query.session;
                tracing::info!("New WebSocket connection with session id: {}", session_id);
                let now = embassy_time::Instant::now().as_secs();
                SessionManager::purge_stale_sessions(now.saturating_sub(SESSION_TTL_SECS)).await;
                SessionManager::create_session(session_id.clone(), now).await;
                params
                    .upgrade
                    .on_upgrade(WebSocket {
                        session: session_id,
                    })
                    .with_protocol("messages")
            }),
        );

    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Starting server at {}:{}", ip_cfg.address, port);
    } else {
        tracing::warn!(
            "Starting WebSocket server on port {port}, but no IPv4 address is assigned yet!"
        );
    }

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 4096]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    session: String,
}

pub struct WsConnectionParams {
    pub upgrade: WebSocketUpgrade,
    pub query: QueryParams,
}

impl<'r, S> FromRequest<'r, S> for WsConnectionParams {
    type Rejection = &'static str;

    async fn from_request<R: Read>(
        state: &'r S,
        parts: RequestParts<'r>,
        body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        let upgrade = WebSocketUpgrade::from_request(state, parts.clone(), body)
            .await
            .map_err(|_| "Failed to extract WebSocketUpgrade")?;

        let query_str = parts.query().ok_or("Missing query parameters")?;
        let query =
            deserialize_form::<QueryParams>(query_str).map_err(|_| "Invalid query parameters")?;

        if query.session.is_empty() {
            return Err("Session ID is required");
        }

        Ok(WsConnectionParams { upgrade, query })
    }
}
