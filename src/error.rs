use std::fmt::{Debug, Display};
use std::io::ErrorKind;

use serde_json::Value;

/// Result for calls made through this crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Handshake or transport level failure on the control channel or a D2D socket
    Connection(ConnectionError),
    /// Error reported by the TV, or a payload that could not be decoded
    Response(ResponseError),
    /// A correlated art request got no reply before its timeout
    NoResponse { request: String },
    /// REST transport failure
    HttpApi(String),
    /// Unsolicited `ms.error` event
    Message(String),
    /// Misuse of the client
    Client(ClientError),
    /// Error from the websocket client
    WebSocket(tungstenite::Error),
    /// Error from the TLS backend
    Tls(native_tls::Error),
    /// Error from http client
    Reqwest(reqwest::Error),
    /// Error from std::io
    IO(std::io::Error),
    /// Error processing json
    Json(serde_json::Error),
    #[doc(hidden)]
    Other(String),
}

impl Error {
    /// Any connection level failure, unauthorized included
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::WebSocket(_) | Error::Tls(_)
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::Unauthorized(_)))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Error::Response(_))
    }

    /// Server reported `error` sub-event
    pub fn is_request_failed(&self) -> bool {
        matches!(self, Error::Response(ResponseError::RequestFailed { .. }))
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self, Error::NoResponse { .. })
    }

    /// No reply or a socket read that ran out of time
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::NoResponse { .. } => true,
            Error::IO(e) => matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock),
            _ => false,
        }
    }

    pub fn is_http_api(&self) -> bool {
        matches!(self, Error::HttpApi(_))
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Error::Message(_))
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Error::Client(_))
    }

    pub fn is_serde(&self) -> bool {
        matches!(self, Error::Json(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Error::IO(_))
    }

    /// Error code for a failed art request
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Error::Response(ResponseError::RequestFailed { code, .. }) => Some(code),
            _ => None,
        }
    }

    pub fn request_failed<S: Into<String>, C: Into<String>>(request: S, code: C) -> Error {
        ResponseError::RequestFailed {
            request: request.into(),
            code: code.into(),
        }
        .into()
    }

    pub fn malformed<S: Into<String>>(reason: S) -> Error {
        ResponseError::Malformed(reason.into()).into()
    }

    pub fn no_response<S: Into<String>>(request: S) -> Error {
        Error::NoResponse {
            request: request.into(),
        }
    }

    pub fn connection_failure<S: Into<String>>(reason: S) -> Error {
        ConnectionError::Failure(reason.into()).into()
    }

    pub fn unreachable() -> Error {
        Error::HttpApi("TV unreachable or feature not supported on this model.".into())
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<ResponseError> for Error {
    fn from(e: ResponseError) -> Self {
        Error::Response(e)
    }
}

impl From<ClientError> for Error {
    fn from(e: ClientError) -> Self {
        Error::Client(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Error {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Error::Connection(ConnectionError::Closed)
            }
            tungstenite::Error::Io(e) => Error::IO(e),
            e => Error::WebSocket(e),
        }
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Error {
        Error::Tls(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        if e.is_connect() {
            Error::unreachable()
        } else {
            Error::Reqwest(e)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<String> for Error {
    fn from(e: String) -> Error {
        Error::Other(e)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "{}", e),
            Self::Response(e) => write!(f, "{}", e),
            Self::NoResponse { request } => {
                write!(f, "No response received for `{}` request", request)
            }
            Self::HttpApi(e) => write!(f, "{}", e),
            Self::Message(e) => write!(f, "{}", e),
            Self::Client(e) => write!(f, "{}", e),
            Self::WebSocket(e) => write!(f, "{}", e),
            Self::Tls(e) => write!(f, "{}", e),
            Self::Reqwest(e) => write!(f, "{}", e),
            Self::IO(e) => write!(f, "{}", e),
            Self::Json(e) => write!(f, "{}", e),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

/// Errors opening or using a connection
#[derive(Debug)]
pub enum ConnectionError {
    /// TV rejected the client, carries the startup frame
    Unauthorized(Value),
    /// Unexpected startup event or broken transfer
    Failure(String),
    /// Socket was closed
    Closed,
    /// Operation needs an open connection
    NotConnected,
    /// Receive loop already running
    AlreadyListening,
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized(frame) => write!(f, "Unauthorized: {}", frame),
            Self::Failure(reason) => write!(f, "Connection failure: {}", reason),
            Self::Closed => write!(f, "Connection closed"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::AlreadyListening => write!(f, "Connection is already listening"),
        }
    }
}

/// Errors reported in a TV response
#[derive(Debug)]
pub enum ResponseError {
    /// Art request answered with an `error` sub-event
    RequestFailed { request: String, code: String },
    /// Payload could not be decoded
    Malformed(String),
    /// Expected field missing from a response
    MissingField(&'static str),
}

impl Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed { request, code } => write!(
                f,
                "`{}` request failed with error number {}",
                request, code
            ),
            Self::Malformed(reason) => write!(f, "Malformed response: {}", reason),
            Self::MissingField(field) => write!(f, "Response has no '{}' field", field),
        }
    }
}

#[derive(Debug)]
pub enum ClientError {
    /// A waiter is already registered under this key
    PendingRequest(String),
    /// Upload source could not be used
    InvalidUpload(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::PendingRequest(key) => {
                write!(f, "A request is already waiting on '{}'", key)
            }
            Self::InvalidUpload(reason) => write!(f, "Invalid upload: {}", reason),
        }
    }
}
