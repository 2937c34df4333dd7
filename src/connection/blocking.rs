use super::{on_lifecycle_event, ConnectionConfig, ConnectionState, Handshake, Listener, StateCell};
use crate::command::Command;
use crate::constants::LISTEN_POLL_INTERVAL;
use crate::error::{ConnectionError, Error, Result};
use crate::frame::Frame;
use crate::token::TokenStore;

use tungstenite::handshake::{HandshakeError, HandshakeRole};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use std::fmt;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

type WsSocket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Channel to one TV app owned by the calling thread
///
/// Reads block for at most the configured timeout, forever when there is none.
/// [`start_listening()`](BlockingConnection::start_listening) moves reading to a background
/// thread, which polls the socket so commands can still be sent.
pub struct BlockingConnection {
    config: ConnectionConfig,
    endpoint: String,
    ready_event: Option<&'static str>,
    state: StateCell,
    socket: Option<Arc<Mutex<WsSocket>>>,
    closing: Arc<AtomicBool>,
    recv_loop: Option<thread::JoinHandle<()>>,
}

impl BlockingConnection {
    pub fn new<S: Into<String>>(config: ConnectionConfig, endpoint: S) -> Self {
        Self {
            config,
            endpoint: endpoint.into(),
            ready_event: None,
            state: StateCell::default(),
            socket: None,
            closing: Arc::new(AtomicBool::new(false)),
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
    pub fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        self.state.set(ConnectionState::Connecting);
        match self.connect() {
            Ok(socket) => {
                self.socket = Some(Arc::new(Mutex::new(socket)));
                self.state.set(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    fn connect(&self) -> Result<WsSocket> {
        let url = self.config.ws_url(&self.endpoint)?;
        log::debug!("WS url {}", url);

        let stream = tcp_connect(&self.config.host, self.config.port, self.config.timeout)?;
        stream.set_read_timeout(self.config.timeout)?;
        stream.set_write_timeout(self.config.timeout)?;

        let connector = self
            .config
            .tls_connector()?
            .map(tungstenite::Connector::NativeTls);
        let (mut socket, _) = tungstenite::client_tls_with_config(url, stream, None, connector)
            .map_err(handshake_error)?;

        let mut handshake = Handshake::new(self.ready_event);
        loop {
            let step = read_frame(&mut socket)
                .and_then(|frame| handshake.on_frame(&frame, &self.config.tokens));
            match step {
                Ok(true) => return Ok(socket),
                Ok(false) => {}
                Err(e) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return Err(e);
                }
            }
        }
    }

    /// Read the next frame. Only available until the connection starts listening.
    pub fn recv(&mut self) -> Result<Frame> {
        if self.recv_loop.is_some() {
            return Err(ConnectionError::AlreadyListening.into());
        }
        let socket = self.socket.as_ref().ok_or(ConnectionError::NotConnected)?;
        let frame = read_frame(&mut lock(socket))?;
        on_lifecycle_event(&frame, &self.config.tokens);
        Ok(frame)
    }

    /// Open if needed and forward every frame to `listener` from a background thread
    pub fn start_listening<L: Listener>(&mut self, listener: L) -> Result<()> {
        if self.recv_loop.is_some() {
            return Err(ConnectionError::AlreadyListening.into());
        }
        self.open()?;

        let socket = self.socket.clone().ok_or(ConnectionError::NotConnected)?;
        set_read_timeout(&lock(&socket), Some(LISTEN_POLL_INTERVAL))?;

        self.closing.store(false, Ordering::SeqCst);
        let closing = self.closing.clone();
        let tokens = self.config.tokens.clone();
        let state = self.state.clone();
        state.set(ConnectionState::Listening);

        let handle = thread::Builder::new()
            .name(format!("{}-recv", self.endpoint))
            .spawn(move || listen(socket, listener, tokens, state, closing))?;
        self.recv_loop = Some(handle);
        Ok(())
    }

    /// Send one command, opening the connection first if needed
    ///
    /// `delay` overrides the configured key press delay.
    pub fn send(&mut self, command: &Command, delay: Option<Duration>) -> Result<()> {
        if let Command::Sleep(pause) = command {
            thread::sleep(*pause);
            return Ok(());
        }

        self.open()?;
        let socket = self.socket.as_ref().ok_or(ConnectionError::NotConnected)?;
        if let Some(payload) = command.payload() {
            log::debug!("Websocket command: {}", payload);
            lock(socket).send(Message::Text(payload.into()))?;
        }

        let delay = delay.unwrap_or(self.config.key_press_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(())
    }

    pub fn send_commands(&mut self, commands: &[Command], delay: Option<Duration>) -> Result<()> {
        for command in commands {
            self.send(command, delay)?;
        }
        Ok(())
    }

    /// Close the socket and join the listener thread
    pub fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            self.closing.store(true, Ordering::SeqCst);
            let mut ws = lock(&socket);
            if let Err(e) = ws.close(None) {
                log::debug!("Close frame not sent: {}", e);
            }
            let _ = ws.flush();
        }

        if let Some(handle) = self.recv_loop.take() {
            if handle.join().is_err() {
                log::warn!("Receive thread panicked");
            }
        }

        self.state.set(ConnectionState::Closed);
        log::debug!("Connection closed.");
        Ok(())
    }
}

impl Drop for BlockingConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for BlockingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .finish()
    }
}

fn lock(socket: &Mutex<WsSocket>) -> MutexGuard<'_, WsSocket> {
    socket.lock().unwrap_or_else(|p| p.into_inner())
}

fn tcp_connect(host: &str, port: u16, limit: Option<Duration>) -> Result<TcpStream> {
    let mut last = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = match limit {
            Some(limit) => TcpStream::connect_timeout(&addr, limit),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => last = Some(e),
        }
    }
    Err(match last {
        Some(e) => e.into(),
        None => Error::connection_failure(format!("could not resolve {}", host)),
    })
}

fn handshake_error<R: HandshakeRole>(e: HandshakeError<R>) -> Error {
    match e {
        HandshakeError::Failure(e) => e.into(),
        HandshakeError::Interrupted(_) => Error::connection_failure("websocket handshake interrupted"),
    }
}

fn set_read_timeout(socket: &WsSocket, limit: Option<Duration>) -> Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(limit)?,
        MaybeTlsStream::NativeTls(stream) => stream.get_ref().set_read_timeout(limit)?,
        #[allow(unreachable_patterns)]
        _ => {}
    }
    Ok(())
}

fn read_frame(socket: &mut WsSocket) -> Result<Frame> {
    loop {
        let msg = socket.read()?;
        if let Message::Close(_) = msg {
            return Err(ConnectionError::Closed.into());
        }
        if let Some(frame) = Frame::from_message(&msg)? {
            return Ok(frame);
        }
    }
}

fn listen<L: Listener>(
    socket: Arc<Mutex<WsSocket>>,
    listener: L,
    tokens: TokenStore,
    state: StateCell,
    closing: Arc<AtomicBool>,
) {
    while !closing.load(Ordering::SeqCst) {
        let msg = lock(&socket).read();
        match msg {
            Ok(Message::Close(_)) => {
                let _ = lock(&socket).flush();
                break;
            }
            Ok(msg) => match Frame::from_message(&msg) {
                Ok(Some(frame)) => {
                    on_lifecycle_event(&frame, &tokens);
                    listener.on_frame(frame);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Dropping undecodable message: {}", e),
            },
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                // let senders take the lock
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                log::debug!("Receive loop stopped: {}", e);
                break;
            }
        }
    }

    state.set(ConnectionState::Closed);
    listener.on_closed();
}
