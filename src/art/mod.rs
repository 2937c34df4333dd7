//! Art Mode channel of Frame TVs
//!
//! [`ArtMode`] keeps one listening connection to `com.samsung.art-app` and lets any number of
//! requests wait on it at once, each matched to its reply by correlation id.
//! [`BlockingArtMode`] runs the same requests in lock-step on the calling thread.
//! Images and thumbnails are moved over short lived D2D sockets, see [`d2d`].

use crate::connection::{Connection, ConnectionConfig, Listener};
use crate::constants::ART_ENDPOINT;
use crate::error::{Error, Result};
use crate::event::{D2D_SERVICE_MESSAGE, MS_CHANNEL_READY};
use crate::frame::Frame;
use crate::rest::{frame_tv_supported, powered_on, DeviceInfoSource, Rest};

use serde_json::Value;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

mod blocking;
pub mod correlator;
pub mod d2d;
mod request;
mod response;
mod status;
mod upload;

pub use self::blocking::BlockingArtMode;
pub use self::correlator::{ArtChannel, PendingTable, Wait, WaitKey};
pub use self::request::{
    conn_info_request, ArtOptions, ArtRequest, CorrelationIds, FallbackPolicy, Slideshow,
};
pub use self::response::{MatteList, Response};
pub use self::status::{ArtModeState, StatusEvent};
pub use self::upload::{UploadOptions, UploadSource};

use self::d2d::Files;
use self::response::decode_nested;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Callback = Arc<dyn Fn(Value) -> BoxFuture + Send + Sync>;

/// Art Mode client for one TV
///
/// Cloning is cheap, clones share the connection and its pending requests.
///
/// # Example
///
/// ```no_run
/// # use samsung_frame::{ArtMode, ConnectionConfig, SECURE_PORT};
/// #
/// # async fn show() -> Result<(), samsung_frame::Error> {
/// let config = ConnectionConfig::new("192.168.1.20")
///     .with_port(SECURE_PORT)
///     .with_token_file("tv-token.txt");
/// let art = ArtMode::new(config)?;
/// art.start_listening().await?;
///
/// for item in art.available(Some("MY-C0002")).await? {
///     println!("{}", item["content_id"]);
/// }
/// art.set_artmode(true).await?;
/// art.close().await?;
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ArtMode {
    inner: Arc<ArtModeRef>,
}

struct ArtModeRef {
    config: ConnectionConfig,
    options: ArtOptions,
    connection_id: String,
    connection: tokio::sync::Mutex<Connection>,
    channel: Mutex<Option<ArtChannel>>,
    pending: PendingTable,
    state: Mutex<ArtModeState>,
    callbacks: Mutex<HashMap<String, Callback>>,
    rest: Arc<dyn DeviceInfoSource>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl ArtMode {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_options(config, ArtOptions::default())
    }

    pub fn with_options(config: ConnectionConfig, options: ArtOptions) -> Result<Self> {
        let rest = Rest::new(&config)?;
        Ok(Self::with_rest(config, options, Arc::new(rest)))
    }

    /// Use another source of device info for capability checks
    pub fn with_rest(
        config: ConnectionConfig,
        options: ArtOptions,
        rest: Arc<dyn DeviceInfoSource>,
    ) -> Self {
        let connection =
            Connection::new(config.clone(), ART_ENDPOINT).with_ready_event(MS_CHANNEL_READY);
        Self {
            inner: Arc::new(ArtModeRef {
                config,
                options,
                connection_id: uuid::Uuid::new_v4().to_string(),
                connection: tokio::sync::Mutex::new(connection),
                channel: Mutex::new(None),
                pending: PendingTable::new(),
                state: Mutex::new(ArtModeState::Unknown),
                callbacks: Mutex::new(HashMap::new()),
                rest,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn options(&self) -> &ArtOptions {
        &self.inner.options
    }

    /// Listening channel, opened on first use and reopened after the TV dropped it
    async fn channel(&self) -> Result<ArtChannel> {
        let mut connection = self.inner.connection.lock().await;
        let current = lock(&self.inner.channel).clone();
        if let (true, Some(channel)) = (connection.is_alive(), current) {
            return Ok(channel);
        }

        connection.close().await?;
        self.inner.pending.cancel_all();

        let dispatcher = Dispatcher {
            art: Arc::downgrade(&self.inner),
        };
        connection.start_listening(dispatcher).await?;
        let channel = ArtChannel::new(
            connection.sender()?,
            self.inner.pending.clone(),
            self.inner.options.clone(),
            self.inner.connection_id.clone(),
        );
        *lock(&self.inner.channel) = Some(channel.clone());
        Ok(channel)
    }

    /// Open the channel and poll the current Art Mode state
    pub async fn start_listening(&self) -> Result<()> {
        self.channel().await?;
        if let Err(e) = self.get_artmode().await {
            log::debug!("Initial art mode poll failed: {}", e);
        }
        Ok(())
    }

    /// Close the channel. Pending requests fail with a closed connection.
    pub async fn close(&self) -> Result<()> {
        lock(&self.inner.channel).take();
        self.inner.connection.lock().await.close().await?;
        self.inner.pending.cancel_all();
        Ok(())
    }

    pub async fn is_alive(&self) -> bool {
        self.inner.connection.lock().await.is_alive()
    }

    /// Number of requests still waiting for a reply
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    /// Run `callback` with the payload of every message carrying `sub_event`
    ///
    /// Callbacks run on their own task and never delay other replies.
    pub fn set_callback<S, F, Fut>(&self, sub_event: S, callback: F)
    where
        S: Into<String>,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback = Arc::new(move |payload| Box::pin(callback(payload)) as BoxFuture);
        lock(&self.inner.callbacks).insert(sub_event.into(), callback);
    }

    pub fn remove_callback(&self, sub_event: &str) {
        lock(&self.inner.callbacks).remove(sub_event);
    }

    /// Wait for the next message carrying `sub_event`, with or without an id
    pub async fn wait_for_event(&self, sub_event: &str, limit: Duration) -> Result<Value> {
        let channel = self.channel().await?;
        let key = WaitKey::SubEvent(sub_event.to_string());
        let rx = channel.pending().register(key.clone(), None)?;
        let response = channel.await_reply(sub_event, &key, rx, limit).await?;
        Ok(response.payload)
    }

    async fn request(&self, request: ArtRequest, wait: Wait) -> Result<Response> {
        self.channel().await?.request(request, wait).await
    }

    async fn set(&self, request: ArtRequest) -> Result<()> {
        let name = request.name().to_string();
        match self.request(request, Wait::Reply).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_no_response() => {
                log::debug!("`{}` was not acknowledged", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Cached Art Mode state, `None` until the TV reported it
    pub fn art_mode(&self) -> Option<bool> {
        self.state().as_bool()
    }

    pub fn state(&self) -> ArtModeState {
        *lock(&self.inner.state)
    }

    /// Whether the TV is a Frame TV
    pub async fn supported(&self) -> Result<bool> {
        Ok(frame_tv_supported(&self.inner.rest.device_info().await?))
    }

    /// Whether the TV is powered on
    pub async fn is_on(&self) -> Result<bool> {
        Ok(powered_on(&self.inner.rest.device_info().await?))
    }

    /// Powered on and showing art, from the cached state
    pub async fn is_artmode(&self) -> Result<bool> {
        Ok(self.is_on().await? && self.art_mode() == Some(true))
    }

    pub async fn get_api_version(&self) -> Result<String> {
        let channel = self.channel().await?;
        match channel.request(ArtRequest::get_api_version(), Wait::Reply).await {
            Ok(response) => response.api_version(),
            Err(e) if channel.options().fallback.should_fallback(&e) => {
                log::debug!("get_api_version failed ({}), trying api_version", e);
                channel
                    .request(ArtRequest::api_version(), Wait::Reply)
                    .await?
                    .api_version()
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_device_info(&self) -> Result<Value> {
        Ok(self.request(ArtRequest::get_device_info(), Wait::Reply).await?.payload)
    }

    /// Uploaded and store artwork, only `category` when given (`MY-C0002` my pictures,
    /// `MY-C0004` favourites, `MY-C0008` store)
    pub async fn available(&self, category: Option<&str>) -> Result<Vec<Value>> {
        self.request(ArtRequest::get_content_list(category), Wait::Reply)
            .await?
            .content_list(category)
    }

    pub async fn get_current(&self) -> Result<Value> {
        Ok(self.request(ArtRequest::get_current_artwork(), Wait::Reply).await?.payload)
    }

    pub async fn set_favourite(&self, content_id: &str, on: bool) -> Result<Value> {
        let status = if on { "on" } else { "off" };
        let request = ArtRequest::change_favorite(content_id, status);
        Ok(self.request(request, Wait::Event("favorite_changed")).await?.payload)
    }

    /// All Art Mode settings, or only the item named `setting` when the TV has it
    pub async fn get_artmode_settings(&self, setting: Option<&str>) -> Result<Value> {
        let response = self.request(ArtRequest::get_artmode_settings(), Wait::Reply).await?;
        pick_setting(&response, setting)
    }

    pub async fn get_auto_rotation_status(&self) -> Result<Value> {
        Ok(self
            .request(ArtRequest::get_auto_rotation_status(), Wait::Reply)
            .await?
            .payload)
    }

    pub async fn set_auto_rotation_status(&self, slideshow: &Slideshow) -> Result<()> {
        self.set(ArtRequest::set_auto_rotation_status(slideshow)).await
    }

    pub async fn get_slideshow_status(&self) -> Result<Value> {
        Ok(self
            .request(ArtRequest::get_slideshow_status(), Wait::Reply)
            .await?
            .payload)
    }

    pub async fn set_slideshow_status(&self, slideshow: &Slideshow) -> Result<()> {
        self.set(ArtRequest::set_slideshow_status(slideshow)).await
    }

    pub async fn get_brightness(&self) -> Result<String> {
        self.setting_with_fallback("brightness", ArtRequest::get_brightness())
            .await
    }

    pub async fn set_brightness(&self, value: i64) -> Result<()> {
        self.set(ArtRequest::set_brightness(value)).await
    }

    pub async fn get_color_temperature(&self) -> Result<String> {
        self.setting_with_fallback("color_temperature", ArtRequest::get_color_temperature())
            .await
    }

    pub async fn set_color_temperature(&self, value: i64) -> Result<()> {
        self.set(ArtRequest::set_color_temperature(value)).await
    }

    /// Read `item` from the unified settings, or with `legacy` when the TV does not have them
    async fn setting_with_fallback(&self, item: &str, legacy: ArtRequest) -> Result<String> {
        let channel = self.channel().await?;
        let fallback = &channel.options().fallback;
        let unified = channel
            .request(ArtRequest::get_artmode_settings(), Wait::Reply)
            .await
            .and_then(|response| response.setting(item));

        match unified {
            Ok(Some(found)) => setting_value(&found, item),
            Ok(None) if *fallback != FallbackPolicy::Never => {
                log::debug!("No `{}` in artmode settings, trying {}", item, legacy.name());
                channel.request(legacy, Wait::Reply).await?.value()
            }
            Ok(None) => Err(Error::malformed(format!("no `{}` in artmode settings", item))),
            Err(e) if fallback.should_fallback(&e) => {
                log::debug!("get_artmode_settings failed ({}), trying {}", e, legacy.name());
                channel.request(legacy, Wait::Reply).await?.value()
            }
            Err(e) => Err(e),
        }
    }

    /// Download thumbnails of `content_ids` over one D2D socket, keyed by file name
    pub async fn get_thumbnail_list(&self, content_ids: &[&str]) -> Result<Files> {
        let channel = self.channel().await?;
        let conn_info = conn_info_request(&channel.next_id());
        let request = ArtRequest::get_thumbnail_list(content_ids, conn_info);
        let response = channel.request(request, Wait::Reply).await?;
        let conn_info = response.conn_info()?;
        let expected = content_ids.len().max(1) as u64;
        d2d::fetch_files(&conn_info, expected, self.inner.options.upload_timeout).await
    }

    /// Download thumbnails one request at a time, in the order asked
    pub async fn get_thumbnail(&self, content_ids: &[&str]) -> Result<Vec<(String, Vec<u8>)>> {
        let channel = self.channel().await?;
        let mut thumbnails = Vec::with_capacity(content_ids.len());
        for content_id in content_ids {
            let conn_info = conn_info_request(&channel.next_id());
            let request = ArtRequest::get_thumbnail(content_id, conn_info);
            let response = channel.request(request, Wait::Reply).await?;
            let files =
                d2d::fetch_files(&response.conn_info()?, 1, self.inner.options.upload_timeout)
                    .await?;
            thumbnails.extend(files);
        }
        Ok(thumbnails)
    }

    /// Thumbnail sent inside the websocket reply, for firmware without D2D thumbnails
    pub async fn get_thumbnail_inband(&self, content_id: &str) -> Result<Vec<u8>> {
        let response = self
            .request(ArtRequest::get_thumbnail_inband(content_id), Wait::Reply)
            .await?;
        response
            .binary
            .ok_or_else(|| Error::malformed("thumbnail reply carried no image data"))
    }

    /// Upload an image and return its new content id
    ///
    /// The TV hands out a D2D socket and key, the image is written to it, then the TV reports
    /// the content id on the websocket.
    pub async fn upload<S: Into<UploadSource>>(
        &self,
        source: S,
        options: UploadOptions,
    ) -> Result<String> {
        let image = upload::prepare(source.into(), &options).await?;
        let limit = self.inner.options.upload_timeout;
        let channel = self.channel().await?;

        let id = channel.next_id();
        let request = ArtRequest::send_image(
            &image.file_type,
            image.data.len(),
            &options.image_date(),
            options.matte.as_deref(),
            options.portrait_matte.as_deref(),
            conn_info_request(&self.inner.connection_id),
        )
        .with_id(id.clone());
        let ready = channel
            .request(request, Wait::SubEvent("ready_to_use"))
            .await?;
        let conn_info = ready.conn_info()?;

        let key = WaitKey::Id(id);
        let added = channel.pending().register(key.clone(), Some("image_added"))?;
        if let Err(e) = d2d::send_file(&conn_info, &image.data, &image.file_type, limit).await {
            channel.pending().remove(&key);
            return Err(e);
        }

        let response = channel.await_reply("send_image", &key, added, limit).await?;
        let content_id = response.content_id()?;
        log::info!("Uploaded {} bytes as {}", image.data.len(), content_id);
        Ok(content_id)
    }

    pub async fn delete(&self, content_id: &str) -> Result<()> {
        self.delete_list(&[content_id]).await
    }

    pub async fn delete_list(&self, content_ids: &[&str]) -> Result<()> {
        self.set(ArtRequest::delete_image_list(content_ids)).await
    }

    pub async fn select_image(
        &self,
        content_id: &str,
        category: Option<&str>,
        show: bool,
    ) -> Result<()> {
        self.set(ArtRequest::select_image(content_id, category, show))
            .await
    }

    /// Ask the TV whether Art Mode is on, `"on"` or `"off"`
    pub async fn get_artmode(&self) -> Result<String> {
        let value = self
            .request(ArtRequest::get_artmode_status(), Wait::Reply)
            .await?
            .value()?;
        StatusEvent::ArtModeStatus(value == "on").apply(&mut lock(&self.inner.state));
        Ok(value)
    }

    pub async fn set_artmode(&self, on: bool) -> Result<()> {
        self.set(ArtRequest::set_artmode_status(if on { "on" } else { "off" }))
            .await
    }

    pub async fn get_rotation(&self) -> Result<i64> {
        self.request(ArtRequest::get_current_rotation(), Wait::Reply)
            .await?
            .rotation()
    }

    pub async fn get_photo_filter_list(&self) -> Result<Vec<Value>> {
        self.request(ArtRequest::get_photo_filter_list(), Wait::Reply)
            .await?
            .filter_list()
    }

    pub async fn set_photo_filter(&self, content_id: &str, filter_id: &str) -> Result<()> {
        self.set(ArtRequest::set_photo_filter(content_id, filter_id))
            .await
    }

    pub async fn get_matte_list(&self) -> Result<MatteList> {
        self.request(ArtRequest::get_matte_list(), Wait::Reply)
            .await?
            .matte_list()
    }

    pub async fn change_matte(
        &self,
        content_id: &str,
        matte: Option<&str>,
        portrait_matte: Option<&str>,
    ) -> Result<()> {
        self.set(ArtRequest::change_matte(content_id, matte, portrait_matte))
            .await
    }
}

impl fmt::Debug for ArtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtMode")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

pub(crate) fn pick_setting(response: &Response, setting: Option<&str>) -> Result<Value> {
    let all = decode_nested(&response.payload, "data")?;
    let found = setting.and_then(|setting| {
        all.as_array()
            .and_then(|items| items.iter().find(|item| item["item"] == setting))
            .cloned()
    });
    Ok(found.unwrap_or(all))
}

pub(crate) fn setting_value(item: &Value, name: &str) -> Result<String> {
    match &item["value"] {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::malformed(format!("`{}` setting value: {}", name, other))),
    }
}

/// Routes frames from the receive loop
struct Dispatcher {
    art: Weak<ArtModeRef>,
}

impl Listener for Dispatcher {
    fn on_frame(&self, frame: Frame) {
        if frame.event() != D2D_SERVICE_MESSAGE {
            return;
        }
        let inner = match self.art.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let payload = match frame.nested() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Dropping art message: {}", e);
                return;
            }
        };
        let sub_event = correlator::sub_event(&payload).to_string();
        log::debug!("Art event {}", sub_event);

        if let Some(event) = StatusEvent::recognize(&payload) {
            let repoll = event.apply(&mut lock(&inner.state));
            if repoll {
                let art = ArtMode {
                    inner: inner.clone(),
                };
                tokio::spawn(async move {
                    if let Err(e) = art.get_artmode().await {
                        log::debug!("Art mode poll after wakeup failed: {}", e);
                    }
                });
            }
        }

        let callback = lock(&inner.callbacks).get(&sub_event).cloned();
        if let Some(callback) = callback {
            tokio::spawn(callback(payload.clone()));
        }

        if !inner.pending.dispatch(&payload, frame.into_binary()) {
            log::debug!("No request waiting for {}", sub_event);
        }
    }

    fn on_closed(&self) {
        if let Some(inner) = self.art.upgrade() {
            inner.pending.cancel_all();
        }
    }
}
