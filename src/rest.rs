//! The TV's small HTTP API

use super::connection::ConnectionConfig;
use super::constants::DEFAULT_REST_TIMEOUT;
use super::error::{Error, Result};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

/// Source of the `device` description used for capability checks
#[async_trait]
pub trait DeviceInfoSource: Send + Sync {
    async fn device_info(&self) -> Result<Value>;
}

/// `device.FrameTVSupport` is the string `"true"`
pub fn frame_tv_supported(info: &Value) -> bool {
    info["device"]["FrameTVSupport"] == "true"
}

/// `device.PowerState` is `"on"`, older models omit it
pub fn powered_on(info: &Value) -> bool {
    info["device"]["PowerState"].as_str().unwrap_or("off") == "on"
}

/// Async REST client
#[derive(Debug, Clone)]
pub struct Rest {
    config: ConnectionConfig,
    client: reqwest::Client,
}

impl Rest {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_REST_TIMEOUT))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    async fn request(&self, method: Method, route: &str) -> Result<Value> {
        let url = self.config.rest_url(route);
        log::debug!("{} {}", method, url);
        let body = self.client.request(method, &url).send().await?.text().await?;
        parse_body(&body)
    }

    pub async fn device_info(&self) -> Result<Value> {
        log::debug!("Get device info via rest api");
        self.request(Method::GET, "").await
    }

    pub async fn app_status(&self, app_id: &str) -> Result<Value> {
        log::debug!("Get app {} status via rest api", app_id);
        self.request(Method::GET, &app_route(app_id)).await
    }

    pub async fn app_run(&self, app_id: &str) -> Result<Value> {
        log::debug!("Run app {} via rest api", app_id);
        self.request(Method::POST, &app_route(app_id)).await
    }

    pub async fn app_close(&self, app_id: &str) -> Result<Value> {
        log::debug!("Close app {} via rest api", app_id);
        self.request(Method::DELETE, &app_route(app_id)).await
    }

    pub async fn app_install(&self, app_id: &str) -> Result<Value> {
        log::debug!("Install app {} via rest api", app_id);
        self.request(Method::PUT, &app_route(app_id)).await
    }
}

#[async_trait]
impl DeviceInfoSource for Rest {
    async fn device_info(&self) -> Result<Value> {
        Rest::device_info(self).await
    }
}

/// Blocking REST client, must not be used from inside an async runtime
#[derive(Debug, Clone)]
pub struct BlockingRest {
    config: ConnectionConfig,
    client: reqwest::blocking::Client,
}

impl BlockingRest {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_REST_TIMEOUT))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn request(&self, method: Method, route: &str) -> Result<Value> {
        let url = self.config.rest_url(route);
        log::debug!("{} {}", method, url);
        let body = self.client.request(method, &url).send()?.text()?;
        parse_body(&body)
    }

    pub fn device_info(&self) -> Result<Value> {
        self.request(Method::GET, "")
    }

    pub fn app_status(&self, app_id: &str) -> Result<Value> {
        self.request(Method::GET, &app_route(app_id))
    }

    pub fn app_run(&self, app_id: &str) -> Result<Value> {
        self.request(Method::POST, &app_route(app_id))
    }

    pub fn app_close(&self, app_id: &str) -> Result<Value> {
        self.request(Method::DELETE, &app_route(app_id))
    }

    pub fn app_install(&self, app_id: &str) -> Result<Value> {
        self.request(Method::PUT, &app_route(app_id))
    }
}

fn app_route(app_id: &str) -> String {
    format!("applications/{}", app_id)
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| Error::malformed(format!("invalid rest response: {}", e)))
}
