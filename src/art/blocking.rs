use super::correlator::{accepts, check_reply, reply_matches, sub_event, Wait};
use super::d2d::{self, Files};
use super::request::{
    conn_info_request, ArtOptions, ArtRequest, CorrelationIds, FallbackPolicy, Slideshow,
};
use super::response::{MatteList, Response};
use super::status::{ArtModeState, StatusEvent};
use super::upload::{self, UploadOptions, UploadSource};
use super::{pick_setting, setting_value};
use crate::command::Command;
use crate::connection::{BlockingConnection, ConnectionConfig};
use crate::constants::ART_ENDPOINT;
use crate::error::{Error, Result};
use crate::event::{D2D_SERVICE_MESSAGE, MS_CHANNEL_READY};
use crate::rest::{frame_tv_supported, powered_on, BlockingRest};

use serde_json::Value;

use std::fmt;
use std::time::Duration;

/// Art Mode client that runs every request in lock-step on the calling thread
///
/// One request is in flight at a time. Replies are read from the socket until one matches,
/// anything else read on the way only updates the cached Art Mode state. Without a timeout in
/// the [`ConnectionConfig`] a reply that never comes blocks forever.
///
/// Setters send their request and return without reading a reply.
pub struct BlockingArtMode {
    connection: BlockingConnection,
    rest: BlockingRest,
    options: ArtOptions,
    connection_id: String,
    state: ArtModeState,
}

impl BlockingArtMode {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_options(config, ArtOptions::default())
    }

    pub fn with_options(config: ConnectionConfig, options: ArtOptions) -> Result<Self> {
        let rest = BlockingRest::new(&config)?;
        let connection =
            BlockingConnection::new(config, ART_ENDPOINT).with_ready_event(MS_CHANNEL_READY);
        Ok(Self {
            connection,
            rest,
            options,
            connection_id: uuid::Uuid::new_v4().to_string(),
            state: ArtModeState::Unknown,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.connection.config()
    }

    pub fn open(&mut self) -> Result<()> {
        self.connection.open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.connection.close()
    }

    pub fn is_alive(&self) -> bool {
        self.connection.is_alive()
    }

    /// Cached Art Mode state, `None` until the TV reported it
    pub fn art_mode(&self) -> Option<bool> {
        self.state.as_bool()
    }

    pub fn state(&self) -> ArtModeState {
        self.state
    }

    fn next_id(&self) -> String {
        match self.options.correlation {
            CorrelationIds::PerRequest => uuid::Uuid::new_v4().to_string(),
            CorrelationIds::PerConnection => self.connection_id.clone(),
        }
    }

    fn send(&mut self, request: ArtRequest) -> Result<ArtRequest> {
        let request = match request.id() {
            Some(_) => request,
            None => {
                let id = self.next_id();
                request.with_id(id)
            }
        };
        let command = Command::art_app_request(&request.to_value());
        self.connection.send(&command, Some(Duration::ZERO))?;
        Ok(request)
    }

    fn emit(&mut self, request: ArtRequest) -> Result<()> {
        self.send(request).map(|_| ())
    }

    fn request(&mut self, request: ArtRequest, wait: Wait) -> Result<Response> {
        let request = self.send(request)?;
        self.read_reply(&request, wait)
    }

    /// Read frames until one answers `request`
    fn read_reply(&mut self, request: &ArtRequest, wait: Wait) -> Result<Response> {
        let (id, required) = match wait {
            Wait::Reply => (request.id(), None),
            Wait::SubEvent(event) => (request.id(), Some(event)),
            Wait::Event(event) => (None, Some(event)),
        };

        loop {
            let frame = match self.connection.recv() {
                Ok(frame) => frame,
                Err(e) if e.is_timeout() => return Err(Error::no_response(request.name())),
                Err(e) => return Err(e),
            };
            if frame.event() != D2D_SERVICE_MESSAGE {
                continue;
            }

            let payload = match frame.nested() {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Dropping art message: {}", e);
                    continue;
                }
            };
            if let Some(event) = StatusEvent::recognize(&payload) {
                event.apply(&mut self.state);
            }

            let event = sub_event(&payload);
            let matched =
                id.map_or(true, |id| reply_matches(&payload, id, request.name(), required));
            if matched && accepts(required, event) {
                let response = Response::new(payload).with_binary(frame.into_binary());
                return check_reply(response, request.name());
            }
            log::debug!("Skipping art event {} while waiting for {}", event, request.name());
        }
    }

    pub fn supported(&self) -> Result<bool> {
        Ok(frame_tv_supported(&self.rest.device_info()?))
    }

    pub fn is_on(&self) -> Result<bool> {
        Ok(powered_on(&self.rest.device_info()?))
    }

    pub fn is_artmode(&self) -> Result<bool> {
        Ok(self.is_on()? && self.art_mode() == Some(true))
    }

    pub fn get_api_version(&mut self) -> Result<String> {
        match self.request(ArtRequest::get_api_version(), Wait::Reply) {
            Ok(response) => response.api_version(),
            Err(e) if self.options.fallback.should_fallback(&e) => self
                .request(ArtRequest::api_version(), Wait::Reply)?
                .api_version(),
            Err(e) => Err(e),
        }
    }

    pub fn get_device_info(&mut self) -> Result<Value> {
        Ok(self.request(ArtRequest::get_device_info(), Wait::Reply)?.payload)
    }

    pub fn available(&mut self, category: Option<&str>) -> Result<Vec<Value>> {
        self.request(ArtRequest::get_content_list(category), Wait::Reply)?
            .content_list(category)
    }

    pub fn get_current(&mut self) -> Result<Value> {
        Ok(self.request(ArtRequest::get_current_artwork(), Wait::Reply)?.payload)
    }

    pub fn set_favourite(&mut self, content_id: &str, on: bool) -> Result<Value> {
        let status = if on { "on" } else { "off" };
        let request = ArtRequest::change_favorite(content_id, status);
        Ok(self.request(request, Wait::SubEvent("favorite_changed"))?.payload)
    }

    pub fn get_artmode_settings(&mut self, setting: Option<&str>) -> Result<Value> {
        let response = self.request(ArtRequest::get_artmode_settings(), Wait::Reply)?;
        pick_setting(&response, setting)
    }

    pub fn get_auto_rotation_status(&mut self) -> Result<Value> {
        Ok(self
            .request(ArtRequest::get_auto_rotation_status(), Wait::Reply)?
            .payload)
    }

    pub fn set_auto_rotation_status(&mut self, slideshow: &Slideshow) -> Result<()> {
        self.emit(ArtRequest::set_auto_rotation_status(slideshow))
    }

    pub fn get_slideshow_status(&mut self) -> Result<Value> {
        Ok(self.request(ArtRequest::get_slideshow_status(), Wait::Reply)?.payload)
    }

    pub fn set_slideshow_status(&mut self, slideshow: &Slideshow) -> Result<()> {
        self.emit(ArtRequest::set_slideshow_status(slideshow))
    }

    pub fn get_brightness(&mut self) -> Result<String> {
        self.setting_with_fallback("brightness", ArtRequest::get_brightness())
    }

    pub fn set_brightness(&mut self, value: i64) -> Result<()> {
        self.emit(ArtRequest::set_brightness(value))
    }

    pub fn get_color_temperature(&mut self) -> Result<String> {
        self.setting_with_fallback("color_temperature", ArtRequest::get_color_temperature())
    }

    pub fn set_color_temperature(&mut self, value: i64) -> Result<()> {
        self.emit(ArtRequest::set_color_temperature(value))
    }

    fn setting_with_fallback(&mut self, item: &str, legacy: ArtRequest) -> Result<String> {
        let unified = self
            .request(ArtRequest::get_artmode_settings(), Wait::Reply)
            .and_then(|response| response.setting(item));
        let fallback = self.options.fallback.clone();

        match unified {
            Ok(Some(found)) => setting_value(&found, item),
            Ok(None) if fallback != FallbackPolicy::Never => {
                self.request(legacy, Wait::Reply)?.value()
            }
            Ok(None) => Err(Error::malformed(format!("no `{}` in artmode settings", item))),
            Err(e) if fallback.should_fallback(&e) => {
                log::debug!("get_artmode_settings failed ({}), trying {}", e, legacy.name());
                self.request(legacy, Wait::Reply)?.value()
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_thumbnail_list(&mut self, content_ids: &[&str]) -> Result<Files> {
        let conn_info = conn_info_request(&self.next_id());
        let request = ArtRequest::get_thumbnail_list(content_ids, conn_info);
        let conn_info = self.request(request, Wait::Reply)?.conn_info()?;
        let expected = content_ids.len().max(1) as u64;
        d2d::blocking::fetch_files(&conn_info, expected, self.options.upload_timeout)
    }

    pub fn get_thumbnail(&mut self, content_ids: &[&str]) -> Result<Vec<(String, Vec<u8>)>> {
        let mut thumbnails = Vec::with_capacity(content_ids.len());
        for content_id in content_ids {
            let conn_info = conn_info_request(&self.next_id());
            let request = ArtRequest::get_thumbnail(content_id, conn_info);
            let conn_info = self.request(request, Wait::Reply)?.conn_info()?;
            let files = d2d::blocking::fetch_files(&conn_info, 1, self.options.upload_timeout)?;
            thumbnails.extend(files);
        }
        Ok(thumbnails)
    }

    pub fn get_thumbnail_inband(&mut self, content_id: &str) -> Result<Vec<u8>> {
        self.request(ArtRequest::get_thumbnail_inband(content_id), Wait::Reply)?
            .binary
            .ok_or_else(|| Error::malformed("thumbnail reply carried no image data"))
    }

    /// Upload an image and return its new content id
    pub fn upload<S: Into<UploadSource>>(
        &mut self,
        source: S,
        options: UploadOptions,
    ) -> Result<String> {
        let image = upload::prepare_blocking(source.into(), &options)?;
        let request = ArtRequest::send_image(
            &image.file_type,
            image.data.len(),
            &options.image_date(),
            options.matte.as_deref(),
            options.portrait_matte.as_deref(),
            conn_info_request(&self.connection_id),
        );
        let request = self.send(request)?;
        let conn_info = self
            .read_reply(&request, Wait::SubEvent("ready_to_use"))?
            .conn_info()?;

        d2d::blocking::send_file(
            &conn_info,
            &image.data,
            &image.file_type,
            self.options.upload_timeout,
        )?;

        self.read_reply(&request, Wait::SubEvent("image_added"))?
            .content_id()
    }

    pub fn delete(&mut self, content_id: &str) -> Result<()> {
        self.delete_list(&[content_id])
    }

    pub fn delete_list(&mut self, content_ids: &[&str]) -> Result<()> {
        self.emit(ArtRequest::delete_image_list(content_ids))
    }

    pub fn select_image(
        &mut self,
        content_id: &str,
        category: Option<&str>,
        show: bool,
    ) -> Result<()> {
        self.emit(ArtRequest::select_image(content_id, category, show))
    }

    pub fn get_artmode(&mut self) -> Result<String> {
        let value = self
            .request(ArtRequest::get_artmode_status(), Wait::Reply)?
            .value()?;
        StatusEvent::ArtModeStatus(value == "on").apply(&mut self.state);
        Ok(value)
    }

    pub fn set_artmode(&mut self, on: bool) -> Result<()> {
        self.emit(ArtRequest::set_artmode_status(if on { "on" } else { "off" }))
    }

    pub fn get_rotation(&mut self) -> Result<i64> {
        self.request(ArtRequest::get_current_rotation(), Wait::Reply)?
            .rotation()
    }

    pub fn get_photo_filter_list(&mut self) -> Result<Vec<Value>> {
        self.request(ArtRequest::get_photo_filter_list(), Wait::Reply)?
            .filter_list()
    }

    pub fn set_photo_filter(&mut self, content_id: &str, filter_id: &str) -> Result<()> {
        self.emit(ArtRequest::set_photo_filter(content_id, filter_id))
    }

    pub fn get_matte_list(&mut self) -> Result<MatteList> {
        self.request(ArtRequest::get_matte_list(), Wait::Reply)?
            .matte_list()
    }

    pub fn change_matte(
        &mut self,
        content_id: &str,
        matte: Option<&str>,
        portrait_matte: Option<&str>,
    ) -> Result<()> {
        self.emit(ArtRequest::change_matte(content_id, matte, portrait_matte))
    }
}

impl fmt::Debug for BlockingArtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingArtMode")
            .field("connection", &self.connection)
            .field("state", &self.state)
            .finish()
    }
}
