use crate::error::Error;

use rand::Rng;
use serde_json::{json, Map, Value};

use std::time::Duration;

use crate::constants::{DEFAULT_ART_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT, NO_MATTE};

/// One `art_app_request`
///
/// The correlation id is written as both `id` and `request_id`, older firmware reads the
/// first and newer firmware the second.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtRequest {
    name: String,
    fields: Map<String, Value>,
    id: Option<String>,
}

impl ArtRequest {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
            id: None,
        }
    }

    pub fn field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The nested request object
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("request".into(), Value::String(self.name.clone()));
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        if let Some(id) = &self.id {
            obj.insert("id".into(), Value::String(id.clone()));
            obj.insert("request_id".into(), Value::String(id.clone()));
        }
        Value::Object(obj)
    }

    pub fn get_api_version() -> Self {
        Self::new("get_api_version")
    }

    /// Name used by newer firmware
    pub fn api_version() -> Self {
        Self::new("api_version")
    }

    pub fn get_device_info() -> Self {
        Self::new("get_device_info")
    }

    pub fn get_content_list(category: Option<&str>) -> Self {
        Self::new("get_content_list").field("category", category)
    }

    pub fn get_current_artwork() -> Self {
        Self::new("get_current_artwork")
    }

    pub fn change_favorite(content_id: &str, status: &str) -> Self {
        Self::new("change_favorite")
            .field("content_id", content_id)
            .field("status", status)
    }

    pub fn get_artmode_settings() -> Self {
        Self::new("get_artmode_settings")
    }

    pub fn get_auto_rotation_status() -> Self {
        Self::new("get_auto_rotation_status")
    }

    pub fn set_auto_rotation_status(slideshow: &Slideshow) -> Self {
        slideshow.apply(Self::new("set_auto_rotation_status"))
    }

    pub fn get_slideshow_status() -> Self {
        Self::new("get_slideshow_status")
    }

    pub fn set_slideshow_status(slideshow: &Slideshow) -> Self {
        slideshow.apply(Self::new("set_slideshow_status"))
    }

    pub fn get_brightness() -> Self {
        Self::new("get_brightness")
    }

    pub fn set_brightness(value: i64) -> Self {
        Self::new("set_brightness").field("value", value)
    }

    pub fn get_color_temperature() -> Self {
        Self::new("get_color_temperature")
    }

    pub fn set_color_temperature(value: i64) -> Self {
        Self::new("set_color_temperature").field("value", value)
    }

    pub fn get_thumbnail_list(content_ids: &[&str], conn_info: Value) -> Self {
        Self::new("get_thumbnail_list")
            .field("content_id_list", content_id_list(content_ids))
            .field("conn_info", conn_info)
    }

    pub fn get_thumbnail(content_id: &str, conn_info: Value) -> Self {
        Self::new("get_thumbnail")
            .field("content_id", content_id)
            .field("conn_info", conn_info)
    }

    /// Thumbnail returned inside the websocket reply
    pub fn get_thumbnail_inband(content_id: &str) -> Self {
        Self::new("get_thumbnail").field("content_id", content_id)
    }

    pub fn send_image(
        file_type: &str,
        file_size: usize,
        date: &str,
        matte: Option<&str>,
        portrait_matte: Option<&str>,
        conn_info: Value,
    ) -> Self {
        Self::new("send_image")
            .field("file_type", file_type)
            .field("conn_info", conn_info)
            .field("image_date", date)
            .field("matte_id", matte.unwrap_or(NO_MATTE))
            .field("portrait_matte_id", portrait_matte.unwrap_or(NO_MATTE))
            .field("file_size", file_size as u64)
    }

    pub fn delete_image_list(content_ids: &[&str]) -> Self {
        Self::new("delete_image_list").field("content_id_list", content_id_list(content_ids))
    }

    pub fn select_image(content_id: &str, category: Option<&str>, show: bool) -> Self {
        Self::new("select_image")
            .field("category_id", category)
            .field("content_id", content_id)
            .field("show", show)
    }

    pub fn get_artmode_status() -> Self {
        Self::new("get_artmode_status")
    }

    pub fn set_artmode_status(value: &str) -> Self {
        Self::new("set_artmode_status").field("value", value)
    }

    pub fn get_current_rotation() -> Self {
        Self::new("get_current_rotation")
    }

    pub fn get_photo_filter_list() -> Self {
        Self::new("get_photo_filter_list")
    }

    pub fn set_photo_filter(content_id: &str, filter_id: &str) -> Self {
        Self::new("set_photo_filter")
            .field("content_id", content_id)
            .field("filter_id", filter_id)
    }

    pub fn get_matte_list() -> Self {
        Self::new("get_matte_list")
    }

    pub fn change_matte(content_id: &str, matte: Option<&str>, portrait_matte: Option<&str>) -> Self {
        let request = Self::new("change_matte")
            .field("content_id", content_id)
            .field("matte_id", matte.unwrap_or(NO_MATTE));
        match portrait_matte {
            Some(portrait) => request.field("portrait_matte_id", portrait),
            None => request,
        }
    }
}

fn content_id_list(content_ids: &[&str]) -> Value {
    Value::Array(
        content_ids
            .iter()
            .map(|id| json!({ "content_id": id }))
            .collect(),
    )
}

/// D2D socket request embedded in transfer requests
pub fn conn_info_request(id: &str) -> Value {
    json!({
        "d2d_mode": "socket",
        "connection_id": rand::thread_rng().gen::<u32>(),
        "id": id,
    })
}

/// Slideshow or auto rotation settings
#[derive(Debug, Clone, PartialEq)]
pub struct Slideshow {
    /// Minutes between images, 0 turns it off
    pub duration: u32,
    /// `shuffleslideshow` rather than `slideshow`
    pub shuffle: bool,
    /// Category number: 2 my pictures, 4 favourites, 8 store
    pub category: u8,
}

impl Default for Slideshow {
    fn default() -> Self {
        Self {
            duration: 0,
            shuffle: true,
            category: 2,
        }
    }
}

impl Slideshow {
    fn apply(&self, request: ArtRequest) -> ArtRequest {
        let value = if self.duration > 0 {
            self.duration.to_string()
        } else {
            "off".to_string()
        };
        request
            .field("value", value)
            .field("category_id", format!("MY-C000{}", self.category))
            .field(
                "type",
                if self.shuffle { "shuffleslideshow" } else { "slideshow" },
            )
    }
}

/// How correlation ids are assigned
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrelationIds {
    /// Fresh id for every logical request
    PerRequest,
    /// One id for the whole connection, for firmware that ignores per request ids
    PerConnection,
}

/// When a getter retries with the older dedicated request
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackPolicy {
    /// Any server error or missing reply
    AnyResponseError,
    /// Only these server error codes
    ErrorCodes(Vec<String>),
    Never,
}

impl FallbackPolicy {
    pub fn should_fallback(&self, e: &Error) -> bool {
        match self {
            FallbackPolicy::AnyResponseError => e.is_response() || e.is_no_response(),
            FallbackPolicy::ErrorCodes(codes) => e
                .error_code()
                .map_or(false, |code| codes.iter().any(|c| c == code)),
            FallbackPolicy::Never => false,
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::AnyResponseError
    }
}

/// Art Mode client options
#[derive(Debug, Clone, PartialEq)]
pub struct ArtOptions {
    /// Wait for a correlated reply
    pub request_timeout: Duration,
    /// D2D socket timeout and wait for the upload confirmation
    pub upload_timeout: Duration,
    pub correlation: CorrelationIds,
    pub fallback: FallbackPolicy,
}

impl Default for ArtOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_ART_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            correlation: CorrelationIds::PerRequest,
            fallback: FallbackPolicy::default(),
        }
    }
}
