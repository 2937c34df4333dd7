//! Remote control channel
//!
//! Key presses, cursor moves and app launches over `samsung.remote.control`.

use super::command::Command;
use super::connection::{BlockingConnection, Connection, ConnectionConfig, Listener};
use super::constants::{APP_LIST_TIMEOUT, BROWSER_APP_ID, REMOTE_ENDPOINT};
use super::error::Result;
use super::event::{parse_installed_apps, ED_APPS_LAUNCH, ED_INSTALLED_APP_GET};
use super::frame::Frame;
use super::rest::{BlockingRest, Rest};

use serde_json::{json, Value};

use std::fmt;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// How a key is pressed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    /// Press and release
    Click,
    /// Hold down until released
    Press,
    Release,
}

impl ToString for KeyAction {
    fn to_string(&self) -> String {
        match self {
            Self::Click => "Click",
            Self::Press => "Press",
            Self::Release => "Release",
        }
        .to_string()
    }
}

impl Default for KeyAction {
    fn default() -> Self {
        KeyAction::Click
    }
}

/// Builders for remote control commands
///
/// Keys are the TV's key codes, `KEY_POWER`, `KEY_HOME`, `KEY_VOLUP` and so on.
#[derive(Debug)]
pub struct RemoteKey;

impl RemoteKey {
    pub fn command(key: &str, action: KeyAction) -> Command {
        Command::remote_control(json!({
            "Cmd": action.to_string(),
            "DataOfCmd": key,
            "Option": "false",
            "TypeOfRemote": "SendRemoteKey",
        }))
    }

    pub fn click(key: &str) -> Command {
        Self::command(key, KeyAction::Click)
    }

    pub fn press(key: &str) -> Command {
        Self::command(key, KeyAction::Press)
    }

    pub fn release(key: &str) -> Command {
        Self::command(key, KeyAction::Release)
    }

    /// Press, wait, release
    pub fn hold(key: &str, duration: Duration) -> Vec<Command> {
        vec![
            Self::press(key),
            Command::sleep(duration),
            Self::release(key),
        ]
    }

    pub fn move_cursor(x: i32, y: i32, duration: Duration) -> Command {
        Command::remote_control(json!({
            "Cmd": "Move",
            "Position": {"x": x, "y": y, "Time": duration.as_millis().to_string()},
            "TypeOfRemote": "ProcessMouseDevice",
        }))
    }

    /// `app_type` is `DEEP_LINK` for store apps and `NATIVE_LAUNCH` for built in ones
    pub fn launch_app(app_id: &str, app_type: &str, meta_tag: &str) -> Command {
        Command::channel_emit(json!({
            "event": ED_APPS_LAUNCH,
            "to": "host",
            "data": {
                "action_type": app_type,
                "appId": app_id,
                "metaTag": meta_tag,
            },
        }))
    }

    pub fn installed_apps() -> Command {
        Command::channel_emit(json!({
            "event": ED_INSTALLED_APP_GET,
            "to": "host",
        }))
    }
}

type Delivery = Box<dyn FnOnce(Vec<Value>) + Send>;

/// Where the next installed app list goes while a listener owns the socket
#[derive(Clone, Default)]
struct AppSlot(Arc<Mutex<Option<Delivery>>>);

impl AppSlot {
    fn put(&self, delivery: Delivery) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Some(delivery);
    }

    fn take(&self) -> Option<Delivery> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Picks installed app replies out of the frames going to a caller's listener
struct RemoteListener<L> {
    apps: AppSlot,
    listener: L,
}

impl<L: Listener> Listener for RemoteListener<L> {
    fn on_frame(&self, frame: Frame) {
        if frame.event() == ED_INSTALLED_APP_GET {
            match parse_installed_apps(&frame) {
                Ok(apps) => {
                    if let Some(deliver) = self.apps.take() {
                        deliver(apps);
                    }
                }
                Err(e) => log::warn!("Bad installed app list: {}", e),
            }
        }
        self.listener.on_frame(frame);
    }

    fn on_closed(&self) {
        self.listener.on_closed();
    }
}

fn installed_apps_from(frame: &Frame) -> Option<Vec<Value>> {
    if frame.event() != ED_INSTALLED_APP_GET {
        log::debug!("Failed to get app list: {}", frame.json());
        return None;
    }
    match parse_installed_apps(frame) {
        Ok(apps) => Some(apps),
        Err(e) => {
            log::debug!("Failed to get app list: {}", e);
            None
        }
    }
}

/// Remote control on tokio
pub struct Remote {
    connection: Connection,
    rest: Rest,
    apps: AppSlot,
    listening: bool,
}

impl Remote {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let rest = Rest::new(&config)?;
        Ok(Self {
            connection: Connection::new(config, REMOTE_ENDPOINT),
            rest,
            apps: AppSlot::default(),
            listening: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn open(&mut self) -> Result<()> {
        self.connection.open().await
    }

    pub async fn start_listening<L: Listener>(&mut self, listener: L) -> Result<()> {
        let listener = RemoteListener {
            apps: self.apps.clone(),
            listener,
        };
        self.connection.start_listening(listener).await?;
        self.listening = true;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.listening = false;
        self.connection.close().await
    }

    pub async fn send(&mut self, command: &Command, delay: Option<Duration>) -> Result<()> {
        self.connection.send(command, delay).await
    }

    /// Send `key` `times` times, pausing `delay` (or the key press delay) after each
    pub async fn send_key(
        &mut self,
        key: &str,
        times: u32,
        delay: Option<Duration>,
        action: KeyAction,
    ) -> Result<()> {
        for _ in 0..times {
            log::debug!("Sending key {}", key);
            self.connection
                .send(&RemoteKey::command(key, action), delay)
                .await?;
        }
        Ok(())
    }

    pub async fn hold_key(&mut self, key: &str, duration: Duration) -> Result<()> {
        self.connection
            .send_commands(&RemoteKey::hold(key, duration), None)
            .await
    }

    pub async fn move_cursor(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        self.connection
            .send(&RemoteKey::move_cursor(x, y, duration), Some(Duration::ZERO))
            .await
    }

    pub async fn run_app(&mut self, app_id: &str, app_type: &str, meta_tag: &str) -> Result<()> {
        log::debug!(
            "Sending run app app_id: {} app_type: {} meta_tag: {}",
            app_id,
            app_type,
            meta_tag
        );
        self.connection
            .send(&RemoteKey::launch_app(app_id, app_type, meta_tag), None)
            .await
    }

    pub async fn open_browser(&mut self, url: &str) -> Result<()> {
        log::debug!("Opening url in browser {}", url);
        self.run_app(BROWSER_APP_ID, "NATIVE_LAUNCH", url).await
    }

    /// Installed apps, `None` when the TV does not answer (not all models do)
    pub async fn app_list(&mut self) -> Result<Option<Vec<Value>>> {
        log::debug!("Get app list (not available on all TVs)");
        if !self.listening {
            self.connection
                .send(&RemoteKey::installed_apps(), None)
                .await?;
            let frame = self.connection.recv().await?;
            return Ok(installed_apps_from(&frame));
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.apps.put(Box::new(move |apps| {
            let _ = tx.send(apps);
        }));
        self.connection
            .send(&RemoteKey::installed_apps(), None)
            .await?;
        match tokio::time::timeout(APP_LIST_TIMEOUT, rx).await {
            Ok(Ok(apps)) => Ok(Some(apps)),
            _ => {
                self.apps.take();
                Ok(None)
            }
        }
    }

    pub async fn rest_device_info(&self) -> Result<Value> {
        self.rest.device_info().await
    }

    pub async fn rest_app_status(&self, app_id: &str) -> Result<Value> {
        self.rest.app_status(app_id).await
    }

    pub async fn rest_app_run(&self, app_id: &str) -> Result<Value> {
        self.rest.app_run(app_id).await
    }

    pub async fn rest_app_close(&self, app_id: &str) -> Result<Value> {
        self.rest.app_close(app_id).await
    }

    pub async fn rest_app_install(&self, app_id: &str) -> Result<Value> {
        self.rest.app_install(app_id).await
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("connection", &self.connection)
            .field("listening", &self.listening)
            .finish()
    }
}

/// Remote control on the calling thread
pub struct BlockingRemote {
    connection: BlockingConnection,
    rest: BlockingRest,
    apps: AppSlot,
    listening: bool,
}

impl BlockingRemote {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let rest = BlockingRest::new(&config)?;
        Ok(Self {
            connection: BlockingConnection::new(config, REMOTE_ENDPOINT),
            rest,
            apps: AppSlot::default(),
            listening: false,
        })
    }

    pub fn connection(&self) -> &BlockingConnection {
        &self.connection
    }

    pub fn open(&mut self) -> Result<()> {
        self.connection.open()
    }

    pub fn start_listening<L: Listener>(&mut self, listener: L) -> Result<()> {
        let listener = RemoteListener {
            apps: self.apps.clone(),
            listener,
        };
        self.connection.start_listening(listener)?;
        self.listening = true;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.listening = false;
        self.connection.close()
    }

    pub fn send(&mut self, command: &Command, delay: Option<Duration>) -> Result<()> {
        self.connection.send(command, delay)
    }

    pub fn send_key(
        &mut self,
        key: &str,
        times: u32,
        delay: Option<Duration>,
        action: KeyAction,
    ) -> Result<()> {
        for _ in 0..times {
            log::debug!("Sending key {}", key);
            self.connection.send(&RemoteKey::command(key, action), delay)?;
        }
        Ok(())
    }

    pub fn hold_key(&mut self, key: &str, duration: Duration) -> Result<()> {
        self.connection
            .send_commands(&RemoteKey::hold(key, duration), None)
    }

    pub fn move_cursor(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        self.connection
            .send(&RemoteKey::move_cursor(x, y, duration), Some(Duration::ZERO))
    }

    pub fn run_app(&mut self, app_id: &str, app_type: &str, meta_tag: &str) -> Result<()> {
        log::debug!(
            "Sending run app app_id: {} app_type: {} meta_tag: {}",
            app_id,
            app_type,
            meta_tag
        );
        self.connection
            .send(&RemoteKey::launch_app(app_id, app_type, meta_tag), None)
    }

    pub fn open_browser(&mut self, url: &str) -> Result<()> {
        log::debug!("Opening url in browser {}", url);
        self.run_app(BROWSER_APP_ID, "NATIVE_LAUNCH", url)
    }

    /// Installed apps, `None` when the TV does not answer (not all models do)
    pub fn app_list(&mut self) -> Result<Option<Vec<Value>>> {
        log::debug!("Get app list (not available on all TVs)");
        if !self.listening {
            self.connection.send(&RemoteKey::installed_apps(), None)?;
            let frame = self.connection.recv()?;
            return Ok(installed_apps_from(&frame));
        }

        let (tx, rx) = mpsc::channel();
        self.apps.put(Box::new(move |apps| {
            let _ = tx.send(apps);
        }));
        self.connection.send(&RemoteKey::installed_apps(), None)?;
        match rx.recv_timeout(APP_LIST_TIMEOUT) {
            Ok(apps) => Ok(Some(apps)),
            Err(_) => {
                self.apps.take();
                Ok(None)
            }
        }
    }

    pub fn rest_device_info(&self) -> Result<Value> {
        self.rest.device_info()
    }

    pub fn rest_app_status(&self, app_id: &str) -> Result<Value> {
        self.rest.app_status(app_id)
    }

    pub fn rest_app_run(&self, app_id: &str) -> Result<Value> {
        self.rest.app_run(app_id)
    }

    pub fn rest_app_close(&self, app_id: &str) -> Result<Value> {
        self.rest.app_close(app_id)
    }

    pub fn rest_app_install(&self, app_id: &str) -> Result<Value> {
        self.rest.app_install(app_id)
    }
}

impl fmt::Debug for BlockingRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingRemote")
            .field("connection", &self.connection)
            .field("listening", &self.listening)
            .finish()
    }
}
