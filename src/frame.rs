use super::error::{Error, Result};

use serde_json::Value;
use tungstenite::Message;

/// Frame body, decided once when the message is parsed
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A plain JSON message
    Json(Value),
    /// JSON object followed by raw bytes in the same message (legacy in-band thumbnails)
    JsonWithTail(Value, Vec<u8>),
}

/// A decoded message from the TV
///
/// Frames are built fresh for every inbound message and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    event: String,
    payload: Payload,
}

impl Frame {
    /// Parse a text message
    pub fn from_text(text: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::malformed(format!("invalid json: {}", e)))?;
        Frame::new(Payload::Json(value))
    }

    /// Parse a binary message
    ///
    /// The whole buffer is tried as JSON first. If that fails the first `{` and its matching
    /// `}` are located by counting braces (quotes are not tracked) and everything after it,
    /// minus one leading newline, becomes the binary tail.
    pub fn from_bytes(bytes: &[u8]) -> Result<Frame> {
        if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
            return Frame::new(Payload::Json(value));
        }

        let start = bytes
            .iter()
            .position(|b| *b == b'{')
            .ok_or_else(|| Error::malformed("no json object in binary message"))?;

        let mut depth = 0usize;
        let mut end = None;
        for (i, b) in bytes[start..].iter().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| Error::malformed("unterminated json object"))?;

        let value: Value = serde_json::from_slice(&bytes[start..end])
            .map_err(|e| Error::malformed(format!("invalid json: {}", e)))?;

        let mut tail = &bytes[end..];
        if tail.first() == Some(&b'\n') {
            tail = &tail[1..];
        }

        Frame::new(Payload::JsonWithTail(value, tail.to_vec()))
    }

    /// Parse a websocket message. Control messages yield `None`.
    pub fn from_message(msg: &Message) -> Result<Option<Frame>> {
        match msg {
            Message::Text(text) => Frame::from_text(text.as_str()).map(Some),
            Message::Binary(bytes) => Frame::from_bytes(bytes).map(Some),
            _ => Ok(None),
        }
    }

    fn new(payload: Payload) -> Result<Frame> {
        let value = match &payload {
            Payload::Json(v) | Payload::JsonWithTail(v, _) => v,
        };
        if !value.is_object() {
            return Err(Error::malformed(format!("expected json object, got {}", value)));
        }
        let event = value["event"].as_str().unwrap_or("*").to_string();
        Ok(Frame { event, payload })
    }

    /// Top level event tag, `"*"` when absent
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The whole JSON object
    pub fn json(&self) -> &Value {
        match &self.payload {
            Payload::Json(v) | Payload::JsonWithTail(v, _) => v,
        }
    }

    /// The `data` member, `Null` when absent
    pub fn data(&self) -> &Value {
        &self.json()["data"]
    }

    /// Decode the `data` member, which art messages carry as a JSON encoded string
    pub fn nested(&self) -> Result<Value> {
        match self.data() {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| Error::malformed(format!("invalid nested json: {}", e))),
            Value::Object(_) => Ok(self.data().clone()),
            other => Err(Error::malformed(format!(
                "`{}` frame has no nested payload: {}",
                self.event, other
            ))),
        }
    }

    /// Pairing token carried in `data.token`
    pub fn token(&self) -> Option<String> {
        match &self.data()["token"] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn binary(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::JsonWithTail(_, tail) => Some(tail),
            Payload::Json(_) => None,
        }
    }

    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self.payload {
            Payload::JsonWithTail(_, tail) => Some(tail),
            Payload::Json(_) => None,
        }
    }
}
