use super::{on_lifecycle_event, ConnectionConfig, ConnectionState, Handshake, Listener, StateCell};
use crate::command::Command;
use crate::constants::CLOSE_TIMEOUT;
use crate::error::{ConnectionError, Error, Result};
use crate::frame::Frame;
use crate::token::TokenStore;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Channel to one TV app, driven by tokio
///
/// After [`open()`](Connection::open) frames can be pulled one at a time with
/// [`recv()`](Connection::recv). [`start_listening()`](Connection::start_listening) hands the
/// read half to a spawned task which feeds a [`Listener`] until the socket closes.
///
/// # Example
///
/// ```
/// # use samsung_frame::{Command, Connection, ConnectionConfig};
/// # use std::time::Duration;
/// #
/// # async fn power() -> samsung_frame::Result<()> {
/// let config = ConnectionConfig::new("192.168.0.20").with_port(8002);
/// let mut remote = Connection::new(config, "samsung.remote.control");
/// remote.open().await?;
/// remote
///     .send(&Command::remote_control(serde_json::json!({
///         "Cmd": "Click",
///         "DataOfCmd": "KEY_POWER",
///         "Option": "false",
///         "TypeOfRemote": "SendRemoteKey",
///     })), None)
///     .await?;
/// remote.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    config: ConnectionConfig,
    endpoint: String,
    ready_event: Option<&'static str>,
    state: StateCell,
    sender: Option<Sender>,
    source: Option<WsSource>,
    recv_loop: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new<S: Into<String>>(config: ConnectionConfig, endpoint: S) -> Self {
        Self {
            config,
            endpoint: endpoint.into(),
            ready_event: None,
            state: StateCell::default(),
            sender: None,
            source: None,
            recv_loop: None,
        }
    }

    /// Require a second, channel specific event before the channel counts as open
    pub fn with_ready_event(mut self, event: &'static str) -> Self {
        self.ready_event = Some(event);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_alive(&self) -> bool {
        matches!(
            self.state.get(),
            ConnectionState::Ready | ConnectionState::Listening
        )
    }

    pub fn token(&self) -> Result<Option<String>> {
        self.config.token()
    }

    /// Connect and run the startup handshake. Does nothing when already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.sender.is_some() {
            return Ok(());
        }

        self.state.set(ConnectionState::Connecting);
        let url = self.config.ws_url(&self.endpoint)?;
        log::debug!("WS url {}", url);

        let connector = self.config.tls_connector()?.map(Connector::NativeTls);
        let connect = connect_async_tls_with_config(url, None, false, connector);
        let stream = match with_timeout(self.config.timeout, connect).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                self.state.set(ConnectionState::Closed);
                return Err(e);
            }
        };

        let (sink, mut source) = stream.split();
        let sender = Sender::new(sink, self.config.key_press_delay);

        let mut handshake = Handshake::new(self.ready_event);
        let tokens = &self.config.tokens;
        let limit = self.config.timeout;
        let result: Result<()> = async {
            loop {
                let frame = with_timeout(limit, next_frame(&mut source)).await?;
                if handshake.on_frame(&frame, tokens)? {
                    return Ok(());
                }
            }
        }
        .await;

        if let Err(e) = result {
            let _ = sender.close().await;
            self.state.set(ConnectionState::Closed);
            return Err(e);
        }

        self.sender = Some(sender);
        self.source = Some(source);
        self.state.set(ConnectionState::Ready);
        Ok(())
    }

    /// Read the next frame. Only available until the connection starts listening.
    pub async fn recv(&mut self) -> Result<Frame> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None if self.recv_loop.is_some() => {
                return Err(ConnectionError::AlreadyListening.into())
            }
            None => return Err(ConnectionError::NotConnected.into()),
        };
        let frame = with_timeout(self.config.timeout, next_frame(source)).await?;
        on_lifecycle_event(&frame, &self.config.tokens);
        Ok(frame)
    }

    /// Open if needed and forward every frame to `listener` from a spawned task
    pub async fn start_listening<L: Listener>(&mut self, listener: L) -> Result<()> {
        if self.recv_loop.is_some() {
            return Err(ConnectionError::AlreadyListening.into());
        }
        self.open().await?;

        let source = self.source.take().ok_or(ConnectionError::NotConnected)?;
        let tokens = self.config.tokens.clone();
        let state = self.state.clone();
        state.set(ConnectionState::Listening);

        self.recv_loop = Some(tokio::spawn(receive_loop(source, listener, tokens, state)));
        Ok(())
    }

    /// Cloneable handle for sending while another task owns the connection
    pub fn sender(&self) -> Result<Sender> {
        self.sender
            .clone()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Send one command, opening the connection first if needed
    ///
    /// `delay` overrides the configured key press delay.
    pub async fn send(&mut self, command: &Command, delay: Option<Duration>) -> Result<()> {
        self.open().await?;
        self.sender()?.send(command, delay).await
    }

    pub async fn send_commands(
        &mut self,
        commands: &[Command],
        delay: Option<Duration>,
    ) -> Result<()> {
        self.open().await?;
        self.sender()?.send_commands(commands, delay).await
    }

    /// Close the socket and wait for the receive loop to finish
    pub async fn close(&mut self) -> Result<()> {
        if let Some(sender) = self.sender.take() {
            if let Err(e) = sender.close().await {
                log::debug!("Close frame not sent: {}", e);
            }
        }
        self.source = None;

        if let Some(mut handle) = self.recv_loop.take() {
            if timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                log::warn!("Receive loop did not stop in time, aborting it");
                handle.abort();
            }
        }

        self.state.set(ConnectionState::Closed);
        log::debug!("Connection closed.");
        Ok(())
    }
}

/// Write half of a [`Connection`]
#[derive(Clone)]
pub struct Sender {
    sink: Arc<Mutex<WsSink>>,
    key_press_delay: Duration,
}

impl Sender {
    fn new(sink: WsSink, key_press_delay: Duration) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            key_press_delay,
        }
    }

    /// Send `command` then pause for `delay`, or the key press delay when `None`
    pub async fn send(&self, command: &Command, delay: Option<Duration>) -> Result<()> {
        let payload = match command {
            Command::Sleep(pause) => {
                sleep(*pause).await;
                return Ok(());
            }
            other => other.payload(),
        };

        if let Some(payload) = payload {
            log::debug!("Websocket command: {}", payload);
            self.sink.lock().await.send(Message::Text(payload.into())).await?;
        }

        let delay = delay.unwrap_or(self.key_press_delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(())
    }

    pub async fn send_commands(&self, commands: &[Command], delay: Option<Duration>) -> Result<()> {
        for command in commands {
            self.send(command, delay).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sink.lock().await.close().await?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_loop.take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .finish()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("key_press_delay", &self.key_press_delay)
            .finish()
    }
}

async fn next_frame(source: &mut WsSource) -> Result<Frame> {
    loop {
        let msg = match source.next().await {
            Some(msg) => msg?,
            None => return Err(ConnectionError::Closed.into()),
        };
        if let Message::Close(_) = msg {
            return Err(ConnectionError::Closed.into());
        }
        if let Some(frame) = Frame::from_message(&msg)? {
            return Ok(frame);
        }
    }
}

async fn with_timeout<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(std::io::Error::new(ErrorKind::TimedOut, "websocket timed out").into()),
        },
        None => fut.await.map_err(Into::into),
    }
}

async fn receive_loop<L: Listener>(
    mut source: WsSource,
    listener: L,
    tokens: TokenStore,
    state: StateCell,
) {
    while let Some(msg) = source.next().await {
        let msg = match msg {
            Ok(Message::Close(_)) => break,
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Receive loop stopped: {}", e);
                break;
            }
        };
        match Frame::from_message(&msg) {
            Ok(Some(frame)) => {
                on_lifecycle_event(&frame, &tokens);
                listener.on_frame(frame);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Dropping undecodable message: {}", e),
        }
    }

    state.set(ConnectionState::Closed);
    listener.on_closed();
}
