// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-thing change streams.
//!
//! A [`ChangeStreamClient`] keeps one upstream notification stream open for a
//! single thing and forwards every received document to a callback.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting -> Connected -> (Disconnected -> Connecting)* -> Closed
//! ```
//!
//! - A dropped or failed connection publishes `None` ("state unknown") and is
//!   retried after a constant delay.
//! - A periodic check refreshes the credential in the background when it is
//!   about to expire; the open stream is not interrupted.
//! - `close()` is idempotent. A connect attempt already in flight is not
//!   cancelled, but the stream it yields is closed unused.
//!
//! All events of one thing run on a single tokio task, so callbacks for one
//! thing never overlap and arrive in upstream order.

use crate::auth::{AuthError, BearerToken, SharedTokenProvider};
use crate::client::thing_url;
use crate::model::Thing;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Change stream errors.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid URL: {0}")]
    Url(String),
}

/// Callback receiving the latest thing state, `None` when unknown.
pub type StateCallback = Arc<dyn Fn(Option<Arc<Thing>>) + Send + Sync>;

/// Open upstream message stream.
#[async_trait]
pub trait MessageStream: Send {
    /// Next text message; `None` once the stream has ended.
    async fn next_message(&mut self) -> Option<Result<String, StreamError>>;

    /// Close the stream.
    async fn close(&mut self);
}

/// Factory of upstream message streams.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn MessageStream>, StreamError>;
}

/// WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct WebSocketMessageStream {
    ws: WsStream,
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn MessageStream>, StreamError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(Box::new(WebSocketMessageStream { ws }))
    }
}

#[async_trait]
impl MessageStream for WebSocketMessageStream {
    async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Binary(_)) => debug!("Ignoring binary frame"),
                Err(e) => return Some(Err(StreamError::Protocol(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Notification envelope sent on the change stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// Full state right after connecting.
    Initial { thing: Box<Thing> },
    /// Full state after a change.
    Change { thing: Box<Thing> },
    /// Anything else; ignored.
    #[serde(other)]
    Unknown,
}

impl Notification {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Carried document, if any.
    pub fn into_thing(self) -> Option<Thing> {
        match self {
            Self::Initial { thing } | Self::Change { thing } => Some(*thing),
            Self::Unknown => None,
        }
    }
}

/// Notification stream URL of a thing.
///
/// The scheme is upgraded to `wss` for `https` APIs and `ws` otherwise.
pub fn notification_url(
    api: &Url,
    application: &str,
    thing: &str,
    token: Option<&str>,
) -> Result<Url, StreamError> {
    let mut url = thing_url(api, application, thing, &["notifications"])
        .map_err(|e| StreamError::Url(e.to_string()))?;
    let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| StreamError::Url(format!("cannot use scheme {} for {}", scheme, api)))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Stream timing and endpoint settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub api: Url,
    pub application: String,
    pub reconnect_delay: Duration,
    pub token_check_interval: Duration,
}

impl StreamSettings {
    pub fn new(api: Url, application: impl Into<String>) -> Self {
        Self {
            api,
            application: application.into(),
            reconnect_delay: Duration::from_secs(5),
            token_check_interval: Duration::from_secs(5),
        }
    }

    /// Set the reconnect delay (builder pattern).
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the token check period (builder pattern).
    pub fn with_token_check_interval(mut self, interval: Duration) -> Self {
        self.token_check_interval = interval;
        self
    }
}

/// Shared collaborators for spawning change stream clients.
#[derive(Clone)]
pub struct StreamFactory {
    settings: Arc<StreamSettings>,
    tokens: SharedTokenProvider,
    transport: Arc<dyn StreamTransport>,
    runtime: Handle,
}

impl StreamFactory {
    /// Create a factory spawning onto the given runtime.
    pub fn new(
        settings: StreamSettings,
        tokens: SharedTokenProvider,
        transport: Arc<dyn StreamTransport>,
        runtime: Handle,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            tokens,
            transport,
            runtime,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Start a client for `thing`; the first connect is scheduled immediately.
    pub fn spawn(&self, thing: impl Into<String>, publish: StateCallback) -> ChangeStreamClient {
        let thing = thing.into();
        let closed = Arc::new(AtomicBool::new(false));
        let (close_tx, close_rx) = watch::channel(false);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let period = self.settings.token_check_interval;
        let task = StreamTask {
            thing: thing.clone(),
            settings: self.settings.clone(),
            tokens: self.tokens.clone(),
            transport: self.transport.clone(),
            publish,
            closed: closed.clone(),
            close_rx,
            token_check: Instant::now() + period,
            refreshing: false,
            refresh_tx,
            refresh_rx,
        };
        self.runtime.spawn(task.run());

        debug!("[{}] Change stream client started", thing);
        ChangeStreamClient {
            thing,
            closed,
            close_tx,
        }
    }
}

/// Handle of a running change stream.
///
/// Dropping the handle closes the stream.
pub struct ChangeStreamClient {
    thing: String,
    closed: Arc<AtomicBool>,
    close_tx: watch::Sender<bool>,
}

impl ChangeStreamClient {
    pub fn thing(&self) -> &str {
        &self.thing
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the stream; no notification is published afterwards.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("[{}] Closing change stream client", self.thing);
            // The task may already be gone.
            let _ = self.close_tx.send(true);
        }
    }
}

impl Drop for ChangeStreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

struct StreamTask {
    thing: String,
    settings: Arc<StreamSettings>,
    tokens: SharedTokenProvider,
    transport: Arc<dyn StreamTransport>,
    publish: StateCallback,
    closed: Arc<AtomicBool>,
    close_rx: watch::Receiver<bool>,
    token_check: Instant,
    refreshing: bool,
    refresh_tx: mpsc::UnboundedSender<Result<Option<BearerToken>, AuthError>>,
    refresh_rx: mpsc::UnboundedReceiver<Result<Option<BearerToken>, AuthError>>,
}

enum Event {
    TokenCheck,
    Refreshed(Result<Option<BearerToken>, AuthError>),
}

impl StreamTask {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn publish(&self, state: Option<Arc<Thing>>) {
        if !self.is_closed() {
            (self.publish)(state);
        }
    }

    async fn run(mut self) {
        loop {
            if self.is_closed() {
                break;
            }

            match self.connect().await {
                Ok(mut stream) => {
                    if self.is_closed() {
                        debug!("[{}] Connected after close, dropping stream", self.thing);
                        stream.close().await;
                        break;
                    }
                    info!("[{}] Change stream connected", self.thing);
                    self.pump(stream).await;
                }
                Err(e) => warn!("[{}] Failed to connect change stream: {}", self.thing, e),
            }

            if self.is_closed() {
                break;
            }

            self.publish(None);
            info!(
                "[{}] Change stream disconnected, reconnecting in {:?}",
                self.thing, self.settings.reconnect_delay
            );
            if !self.wait_reconnect().await {
                break;
            }
        }
        debug!("[{}] Change stream client stopped", self.thing);
    }

    async fn connect(&self) -> Result<Box<dyn MessageStream>, StreamError> {
        let token = self.tokens.bearer_token().await?;
        let url = notification_url(
            &self.settings.api,
            &self.settings.application,
            &self.thing,
            token.as_ref().map(|t| t.access_token.as_str()),
        )?;

        let mut redacted = url.clone();
        redacted.set_query(None);
        info!("[{}] Connecting change stream: {}", self.thing, redacted);

        self.transport.open(&url).await
    }

    /// Forward messages until the stream ends or the client is closed.
    async fn pump(&mut self, mut stream: Box<dyn MessageStream>) {
        loop {
            let message = tokio::select! {
                _ = self.close_rx.changed() => {
                    stream.close().await;
                    return;
                }
                _ = tokio::time::sleep_until(self.token_check) => {
                    self.handle(Event::TokenCheck);
                    continue;
                }
                Some(result) = self.refresh_rx.recv() => {
                    self.handle(Event::Refreshed(result));
                    continue;
                }
                message = stream.next_message() => message,
            };

            match message {
                Some(Ok(text)) => match Notification::parse(&text) {
                    Ok(notification) => match notification.into_thing() {
                        Some(thing) => self.publish(Some(Arc::new(thing))),
                        None => debug!("[{}] Ignoring notification", self.thing),
                    },
                    Err(e) => {
                        warn!("[{}] Malformed notification: {}", self.thing, e);
                        stream.close().await;
                        return;
                    }
                },
                Some(Err(e)) => {
                    warn!("[{}] Change stream error: {}", self.thing, e);
                    return;
                }
                None => return,
            }
        }
    }

    /// Sleep the reconnect delay; false if closed meanwhile.
    async fn wait_reconnect(&mut self) -> bool {
        let deadline = Instant::now() + self.settings.reconnect_delay;
        loop {
            let event = tokio::select! {
                _ = self.close_rx.changed() => return false,
                _ = tokio::time::sleep_until(deadline) => return !self.is_closed(),
                _ = tokio::time::sleep_until(self.token_check) => Event::TokenCheck,
                Some(result) = self.refresh_rx.recv() => Event::Refreshed(result),
            };
            self.handle(event);
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::TokenCheck => {
                self.token_check = Instant::now() + self.settings.token_check_interval;
                if !self.refreshing && self.tokens.needs_refresh() {
                    debug!("[{}] Refreshing access token", self.thing);
                    self.refreshing = true;
                    let tokens = self.tokens.clone();
                    let tx = self.refresh_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(tokens.bearer_token().await);
                    });
                }
            }
            Event::Refreshed(result) => {
                self.refreshing = false;
                match result {
                    Ok(_) => debug!("[{}] Access token refreshed", self.thing),
                    Err(e) => warn!("[{}] Failed to refresh access token: {}", self.thing, e),
                }
            }
        }
    }
}
