use super::test_config;

use samsung_frame::ConnectionConfig;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use std::sync::{Arc, Mutex};
use std::time::Duration;

type Sink = Arc<AsyncMutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;
type Responder = Arc<dyn Fn(&Value) -> Vec<Reply> + Send + Sync>;

/// What the TV sends right after the websocket handshake
#[derive(Debug, Clone)]
pub enum Startup {
    /// `ms.channel.connect` with an optional token, then `ms.channel.ready`
    Ready(Option<String>),
    /// `ms.channel.connect` only, as the remote control channel does
    Connect(Option<String>),
    /// Exactly these frames
    Frames(Vec<Value>),
}

impl Startup {
    fn frames(&self) -> Vec<Value> {
        match self {
            Startup::Ready(token) => vec![connect_frame(token), json!({"event": "ms.channel.ready", "data": {}})],
            Startup::Connect(token) => vec![connect_frame(token)],
            Startup::Frames(frames) => frames.clone(),
        }
    }
}

fn connect_frame(token: &Option<String>) -> Value {
    let mut data = json!({"clients": [], "id": "simulated"});
    if let Some(token) = token {
        data["token"] = json!(token);
    }
    json!({"event": "ms.channel.connect", "data": data})
}

/// One thing the TV sends back
#[derive(Debug, Clone)]
pub enum Reply {
    /// `d2d_service_message` carrying this nested payload
    Nested(Value),
    /// A frame sent as is
    Frame(Value),
    Binary(Vec<u8>),
    /// Pause before the following replies, other requests are still answered meanwhile
    Wait(Duration),
}

/// Wrap a nested art payload the way the TV does
pub fn d2d_message(nested: &Value) -> Value {
    json!({"event": "d2d_service_message", "data": nested.to_string()})
}

/// WebSocket server that behaves like a TV
///
/// Art requests are handed to the responder as their decoded nested request, every other
/// message as it was received.
#[derive(Clone)]
pub struct SimulatedTv {
    pub port: u16,
    received: Arc<Mutex<Vec<Value>>>,
    uris: Arc<Mutex<Vec<String>>>,
}

impl SimulatedTv {
    pub async fn start<F>(startup: Startup, responder: F) -> SimulatedTv
    where
        F: Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let tv = SimulatedTv {
            port,
            received: Arc::new(Mutex::new(Vec::new())),
            uris: Arc::new(Mutex::new(Vec::new())),
        };

        let responder: Responder = Arc::new(responder);
        let server = tv.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(server.clone().session(stream, startup.clone(), responder.clone()));
            }
        });
        log::info!(target: "test::simulated_tv::start", "Simulated TV on port {}", port);
        tv
    }

    /// Remote control channel that records commands and answers nothing
    pub async fn silent(startup: Startup) -> SimulatedTv {
        Self::start(startup, |_| Vec::new()).await
    }

    pub fn config(&self) -> ConnectionConfig {
        test_config(self.port)
    }

    /// Every message received, in order
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Decoded nested art requests, in order
    pub fn art_requests(&self) -> Vec<Value> {
        self.received()
            .iter()
            .filter_map(art_request)
            .collect()
    }

    /// Request URIs of the websocket handshakes
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }

    async fn session(self, stream: TcpStream, startup: Startup, responder: Responder) {
        let uris = self.uris.clone();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            uris.lock().unwrap().push(req.uri().to_string());
            Ok(resp)
        };
        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                log::warn!(target: "test::simulated_tv::session", "Handshake failed: {}", e);
                return;
            }
        };

        let (sink, mut source) = ws.split();
        let sink: Sink = Arc::new(AsyncMutex::new(sink));
        for frame in startup.frames() {
            send(&sink, Reply::Frame(frame)).await;
        }

        while let Some(Ok(msg)) = source.next().await {
            let text = match msg {
                Message::Text(text) => text.as_str().to_string(),
                Message::Close(_) => break,
                _ => continue,
            };
            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!(target: "test::simulated_tv::session", "Bad message '{}': {}", text, e);
                    continue;
                }
            };
            self.received.lock().unwrap().push(value.clone());

            let request = art_request(&value).unwrap_or(value);
            let replies = responder(&request);
            let sink = sink.clone();
            tokio::spawn(async move {
                for reply in replies {
                    send(&sink, reply).await;
                }
            });
        }
    }
}

fn art_request(value: &Value) -> Option<Value> {
    if value["params"]["event"] != "art_app_request" {
        return None;
    }
    serde_json::from_str(value["params"]["data"].as_str()?).ok()
}

async fn send(sink: &Sink, reply: Reply) {
    let msg = match reply {
        Reply::Nested(nested) => Message::Text(d2d_message(&nested).to_string().into()),
        Reply::Frame(frame) => Message::Text(frame.to_string().into()),
        Reply::Binary(bytes) => Message::Binary(bytes.into()),
        Reply::Wait(pause) => {
            sleep(pause).await;
            return;
        }
    };
    if let Err(e) = sink.lock().await.send(msg).await {
        log::debug!(target: "test::simulated_tv::send", "Reply not sent: {}", e);
    }
}
