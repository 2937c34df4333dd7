//! WebSocket channel to the TV
//!
//! [`Connection`] runs on tokio and drains the socket from a spawned task once listening.
//! [`BlockingConnection`] owns the socket on the caller's thread and moves it to a listener
//! thread when asked. Both share URL building, the startup handshake and the per frame
//! lifecycle hook defined here.

use super::constants::*;
use super::error::{ConnectionError, Error, Result};
use super::event::{self, EventKind};
use super::frame::Frame;
use super::token::TokenStore;

use base64::Engine;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod blocking;
mod client;

pub use self::blocking::BlockingConnection;
pub use self::client::{Connection, Sender};

/// Settings shared by every channel opened to one TV
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub tokens: TokenStore,
    /// Network timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Pause after every sent command
    pub key_press_delay: Duration,
    /// Client name shown on the TV when asking for permission
    pub name: String,
}

impl ConnectionConfig {
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            tokens: TokenStore::default(),
            timeout: None,
            key_press_delay: DEFAULT_KEY_PRESS_DELAY,
            name: DEFAULT_NAME.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use a token held in memory
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.tokens = TokenStore::memory(Some(token.into()));
        self
    }

    /// Read the token from, and save new tokens to, a file
    pub fn with_token_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tokens = TokenStore::file(path);
        self
    }

    pub fn with_token_store(mut self, tokens: TokenStore) -> Self {
        self.tokens = tokens;
        self
    }

    /// A zero timeout means no timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_key_press_delay(mut self, delay: Duration) -> Self {
        self.key_press_delay = delay;
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_secure(&self) -> bool {
        self.port == SECURE_PORT
    }

    pub fn token(&self) -> Result<Option<String>> {
        self.tokens.get()
    }

    /// Channel URL for `app`. The secure port also carries the token when one is known.
    pub fn ws_url(&self, app: &str) -> Result<String> {
        let name = base64::engine::general_purpose::STANDARD.encode(&self.name);
        let mut url = format!(
            "{}://{}:{}/api/v2/channels/{}?name={}",
            if self.is_secure() { "wss" } else { "ws" },
            self.host,
            self.port,
            app,
            name
        );
        if self.is_secure() {
            if let Some(token) = self.token()? {
                url.push_str("&token=");
                url.push_str(&token);
            }
        }
        Ok(url)
    }

    pub fn rest_url(&self, route: &str) -> String {
        format!(
            "{}://{}:{}/api/v2/{}",
            if self.is_secure() { "https" } else { "http" },
            self.host,
            self.port,
            route
        )
    }

    /// TLS settings for the secure port. The TV presents a self signed certificate.
    pub(crate) fn tls_connector(&self) -> Result<Option<native_tls::TlsConnector>> {
        if !self.is_secure() {
            return Ok(None);
        }
        Ok(Some(insecure_tls()?))
    }
}

pub(crate) fn insecure_tls() -> Result<native_tls::TlsConnector> {
    Ok(native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Ready,
    Listening,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Closed
    }
}

/// State shared between a connection and its receive loop
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<Mutex<ConnectionState>>);

impl StateCell {
    pub fn get(&self) -> ConnectionState {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set(&self, state: ConnectionState) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }
}

/// Receives every frame once a connection is listening
pub trait Listener: Send + Sync + 'static {
    fn on_frame(&self, frame: Frame);

    /// The receive loop has ended
    fn on_closed(&self) {}
}

impl<F> Listener for F
where
    F: Fn(Frame) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: Frame) {
        self(frame)
    }
}

/// Hook run on every received frame: error logging and token capture
pub(crate) fn on_lifecycle_event(frame: &Frame, tokens: &TokenStore) {
    if EventKind::of(frame) == EventKind::Error {
        log::warn!("Websocket error message: {}", frame.json());
        if event::is_unsupported_v2(frame) {
            log::error!("TV does not seem to support the v2 API");
        }
    } else {
        log::debug!("Websocket event: {}", frame.json());
    }

    if let Some(token) = frame.token() {
        log::info!("New token {}", token);
        if let Err(e) = tokens.set(&token) {
            log::warn!("Unable to save token: {}", e);
        }
    }
}

/// Startup sequence seen by a freshly opened channel
///
/// Housekeeping events are skipped. The first real event must be the connect event, and
/// channels that announce readiness separately must send that event next.
#[derive(Debug)]
pub(crate) struct Handshake {
    ready_event: Option<&'static str>,
    connected: bool,
}

impl Handshake {
    pub fn new(ready_event: Option<&'static str>) -> Self {
        Self {
            ready_event,
            connected: false,
        }
    }

    /// Feed one frame, `Ok(true)` once the channel is usable
    pub fn on_frame(&mut self, frame: &Frame, tokens: &TokenStore) -> Result<bool> {
        on_lifecycle_event(frame, tokens);

        if EventKind::ignored_at_startup(frame.event()) {
            return Ok(false);
        }

        if !self.connected {
            return match EventKind::of(frame) {
                EventKind::Unauthorized => {
                    Err(ConnectionError::Unauthorized(frame.json().clone()).into())
                }
                EventKind::Connect => {
                    self.connected = true;
                    Ok(self.ready_event.is_none())
                }
                _ => Err(unexpected(frame)),
            };
        }

        match self.ready_event {
            Some(ready) if frame.event() == ready => Ok(true),
            _ => Err(unexpected(frame)),
        }
    }
}

fn unexpected(frame: &Frame) -> Error {
    Error::connection_failure(format!("unexpected startup event: {}", frame.json()))
}
