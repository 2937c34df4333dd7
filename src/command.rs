use std::time::Duration;

use serde_json::{json, Value};

pub const MS_CHANNEL_EMIT: &str = "ms.channel.emit";
pub const MS_REMOTE_CONTROL: &str = "ms.remote.control";
pub const ART_APP_REQUEST: &str = "art_app_request";

/// Something that can be sent over a [`Connection`](crate::Connection)
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `{"method": .., "params": ..}` envelope
    Message { method: String, params: Value },
    /// Caller built JSON sent as is
    Raw(Value),
    /// Sends nothing and only waits, used to build key macros
    Sleep(Duration),
}

impl Command {
    pub fn new<S: Into<String>>(method: S, params: Value) -> Command {
        Command::Message {
            method: method.into(),
            params,
        }
    }

    pub fn remote_control(params: Value) -> Command {
        Command::new(MS_REMOTE_CONTROL, params)
    }

    pub fn channel_emit(params: Value) -> Command {
        Command::new(MS_CHANNEL_EMIT, params)
    }

    /// Wrap an art request in its `art_app_request` envelope. The request travels JSON encoded.
    pub fn art_app_request(data: &Value) -> Command {
        Command::channel_emit(json!({
            "event": ART_APP_REQUEST,
            "to": "host",
            "data": data.to_string(),
        }))
    }

    pub fn sleep(delay: Duration) -> Command {
        Command::Sleep(delay)
    }

    pub fn is_sleep(&self) -> bool {
        matches!(self, Command::Sleep(_))
    }

    /// Serialized message, `None` for [`Command::Sleep`]
    pub fn payload(&self) -> Option<String> {
        match self {
            Command::Message { method, params } => {
                Some(json!({ "method": method, "params": params }).to_string())
            }
            Command::Raw(value) => Some(value.to_string()),
            Command::Sleep(_) => None,
        }
    }
}

impl From<Value> for Command {
    fn from(value: Value) -> Self {
        Command::Raw(value)
    }
}
