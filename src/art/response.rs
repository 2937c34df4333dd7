use super::d2d::ConnInfo;
use crate::error::{Error, ResponseError, Result};

use serde_json::Value;

/// Nested payload of a correlated `d2d_service_message`
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub payload: Value,
    /// Raw bytes that followed the JSON in the same message
    pub binary: Option<Vec<u8>>,
}

impl Response {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            binary: None,
        }
    }

    pub fn with_binary(mut self, binary: Option<Vec<u8>>) -> Self {
        self.binary = binary;
        self
    }

    /// Nested `event` tag, `"*"` when absent
    pub fn sub_event(&self) -> &str {
        self.payload["event"].as_str().unwrap_or("*")
    }

    pub fn api_version(&self) -> Result<String> {
        string_field(&self.payload, "version")
    }

    /// Content list, only items in `category` when given
    pub fn content_list(&self, category: Option<&str>) -> Result<Vec<Value>> {
        let items = list_field(&self.payload, "content_list")?;
        Ok(match category {
            Some(category) => items
                .into_iter()
                .filter(|item| item["category_id"] == category)
                .collect(),
            None => items,
        })
    }

    pub fn value(&self) -> Result<String> {
        string_field(&self.payload, "value")
    }

    /// `current_rotation_status`, 0 when the TV leaves it out
    pub fn rotation(&self) -> Result<i64> {
        match &self.payload["current_rotation_status"] {
            Value::Null => Ok(0),
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| Error::malformed(format!("rotation: {}", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::malformed(format!("rotation: {}", s))),
            other => Err(Error::malformed(format!("rotation: {}", other))),
        }
    }

    pub fn filter_list(&self) -> Result<Vec<Value>> {
        list_field(&self.payload, "filter_list")
    }

    /// Matte types, from `matte_type_list` or the newer `matte_list`, and colours when sent
    pub fn matte_list(&self) -> Result<MatteList> {
        let types = if self.payload.get("matte_list").is_some() {
            list_field(&self.payload, "matte_list")?
        } else {
            list_field(&self.payload, "matte_type_list")?
        };
        let colors = match self.payload.get("matte_color_list") {
            Some(_) => Some(list_field(&self.payload, "matte_color_list")?),
            None => None,
        };
        Ok(MatteList { types, colors })
    }

    /// Item named `setting` from a `get_artmode_settings` reply
    pub fn setting(&self, setting: &str) -> Result<Option<Value>> {
        if self.payload.get("data").is_none() {
            return Ok(None);
        }
        Ok(list_field(&self.payload, "data")?
            .into_iter()
            .find(|item| item["item"] == setting))
    }

    pub fn conn_info(&self) -> Result<ConnInfo> {
        match self.payload.get("conn_info") {
            Some(info) => ConnInfo::from_value(info),
            None => Err(ResponseError::MissingField("conn_info").into()),
        }
    }

    pub fn content_id(&self) -> Result<String> {
        string_field(&self.payload, "content_id")
    }
}

/// Mattes known to the TV
#[derive(Debug, Clone, PartialEq)]
pub struct MatteList {
    pub types: Vec<Value>,
    pub colors: Option<Vec<Value>>,
}

/// Decode a field the TV may send JSON encoded a second time
pub(crate) fn decode_nested(value: &Value, field: &'static str) -> Result<Value> {
    match value.get(field) {
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| Error::malformed(format!("`{}` is not valid json: {}", field, e))),
        Some(Value::Null) | None => Err(ResponseError::MissingField(field).into()),
        Some(other) => Ok(other.clone()),
    }
}

fn list_field(value: &Value, field: &'static str) -> Result<Vec<Value>> {
    match decode_nested(value, field)? {
        Value::Array(items) => Ok(items),
        other => Err(Error::malformed(format!("`{}` is not a list: {}", field, other))),
    }
}

fn string_field(value: &Value, field: &'static str) -> Result<String> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ResponseError::MissingField(field).into()),
    }
}
