//! Matching `d2d_service_message` replies to the requests waiting on them

use super::request::{ArtOptions, ArtRequest, CorrelationIds};
use super::response::Response;
use crate::command::Command;
use crate::connection::Sender;
use crate::error::{ClientError, ConnectionError, Error, Result};

use serde_json::Value;
use tokio::sync::oneshot;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What a waiter is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// Correlation id echoed as `request_id` or `id`
    Id(String),
    /// Sub-event name, for unsolicited events that carry no id
    SubEvent(String),
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitKey::Id(id) => write!(f, "id {}", id),
            WaitKey::SubEvent(event) => write!(f, "event {}", event),
        }
    }
}

/// Which reply completes a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wait {
    /// The first reply carrying our id
    Reply,
    /// A reply carrying our id and this sub-event
    SubEvent(&'static str),
    /// The next message with this sub-event, id or not
    Event(&'static str),
}

struct Waiter {
    sub_event: Option<String>,
    tx: oneshot::Sender<Response>,
}

/// Outstanding requests of one art channel
#[derive(Clone, Default)]
pub struct PendingTable {
    waiters: Arc<Mutex<HashMap<WaitKey, Waiter>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WaitKey, Waiter>> {
        self.waiters.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a waiter. A key can have a single live waiter.
    pub fn register(
        &self,
        key: WaitKey,
        sub_event: Option<&str>,
    ) -> Result<oneshot::Receiver<Response>> {
        let mut waiters = self.lock();
        if let Some(waiter) = waiters.get(&key) {
            if !waiter.tx.is_closed() {
                return Err(ClientError::PendingRequest(key.to_string()).into());
            }
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(
            key,
            Waiter {
                sub_event: sub_event.map(String::from),
                tx,
            },
        );
        Ok(rx)
    }

    pub fn remove(&self, key: &WaitKey) {
        self.lock().remove(key);
    }

    /// Hand a nested payload to its waiter. Returns whether one took it.
    pub fn dispatch(&self, payload: &Value, binary: Option<Vec<u8>>) -> bool {
        let event = sub_event(payload);
        let mut waiters = self.lock();

        let key = reply_ids(payload)
            .map(|id| WaitKey::Id(id.to_string()))
            .find(|key| {
                waiters
                    .get(key)
                    .map_or(false, |w| accepts(w.sub_event.as_deref(), event))
            })
            .or_else(|| {
                let key = WaitKey::SubEvent(event.to_string());
                if waiters.contains_key(&key) {
                    Some(key)
                } else {
                    None
                }
            });

        let waiter = match key.and_then(|key| waiters.remove(&key)) {
            Some(waiter) => waiter,
            None => return false,
        };
        drop(waiters);

        let response = Response::new(payload.clone()).with_binary(binary);
        if waiter.tx.send(response).is_err() {
            log::debug!("Waiter for `{}` went away before its reply", event);
            return false;
        }
        true
    }

    /// Drop every waiter, they observe a closed connection
    pub fn cancel_all(&self) {
        let dropped = self.lock().drain().count();
        if dropped > 0 {
            log::debug!("Cancelled {} pending art requests", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("pending", &self.len())
            .finish()
    }
}

fn reply_ids(payload: &Value) -> impl Iterator<Item = &str> {
    ["request_id", "id"]
        .iter()
        .filter_map(move |field| payload[*field].as_str())
}

/// Lock-step match of a payload against the request `id` named `request`
///
/// A payload without any id only answers when its sub-event names the request or the
/// required sub-event, or it is an error echoing the request. Status events never do.
pub(crate) fn reply_matches(
    payload: &Value,
    id: &str,
    request: &str,
    required: Option<&str>,
) -> bool {
    let mut ids = reply_ids(payload).peekable();
    if ids.peek().is_some() {
        return ids.any(|reply| reply == id);
    }
    let event = sub_event(payload);
    event == request
        || required == Some(event)
        || (event == "error" && echoed_request(payload).as_deref() == Some(request))
}

pub(crate) fn sub_event(payload: &Value) -> &str {
    payload["event"].as_str().unwrap_or("*")
}

/// A reply satisfies a waiter when no sub-event is required, it is the
/// required one, or it reports an error
pub(crate) fn accepts(required: Option<&str>, event: &str) -> bool {
    match required {
        None => true,
        Some(required) => required == event || event == "error",
    }
}

/// Request name echoed in `request_data`, sent either as a JSON string or an object
fn echoed_request(payload: &Value) -> Option<String> {
    let name = |data: &Value| data["request"].as_str().map(String::from);
    match &payload["request_data"] {
        Value::String(s) => serde_json::from_str::<Value>(s).ok().as_ref().and_then(name),
        data @ Value::Object(_) => name(data),
        _ => None,
    }
}

/// Turn an `error` sub-event into [`Error::Response`]
pub(crate) fn check_reply(response: Response, request: &str) -> Result<Response> {
    if response.sub_event() != "error" {
        return Ok(response);
    }
    let payload = &response.payload;
    let echoed = echoed_request(payload);
    let name = echoed.as_deref().unwrap_or(request);
    let code = match &payload["error_code"] {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    };
    Err(Error::request_failed(name, code))
}

/// Request side of a listening art channel
#[derive(Debug, Clone)]
pub struct ArtChannel {
    sender: Sender,
    pending: PendingTable,
    options: ArtOptions,
    connection_id: String,
}

impl ArtChannel {
    pub fn new(
        sender: Sender,
        pending: PendingTable,
        options: ArtOptions,
        connection_id: String,
    ) -> Self {
        Self {
            sender,
            pending,
            options,
            connection_id,
        }
    }

    pub fn options(&self) -> &ArtOptions {
        &self.options
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn next_id(&self) -> String {
        match self.options.correlation {
            CorrelationIds::PerRequest => uuid::Uuid::new_v4().to_string(),
            CorrelationIds::PerConnection => self.connection_id.clone(),
        }
    }

    /// Give `request` an id unless it already has one
    pub fn identify(&self, request: ArtRequest) -> ArtRequest {
        if request.id().is_some() {
            request
        } else {
            let id = self.next_id();
            request.with_id(id)
        }
    }

    /// Send without waiting for anything
    pub async fn emit(&self, request: ArtRequest) -> Result<()> {
        let request = self.identify(request);
        self.send(&request).await
    }

    async fn send(&self, request: &ArtRequest) -> Result<()> {
        let command = Command::art_app_request(&request.to_value());
        self.sender.send(&command, Some(Duration::ZERO)).await
    }

    /// Send `request` and wait for its reply
    pub async fn request(&self, request: ArtRequest, wait: Wait) -> Result<Response> {
        let limit = self.options.request_timeout;
        self.request_within(request, wait, limit).await
    }

    pub async fn request_within(
        &self,
        request: ArtRequest,
        wait: Wait,
        limit: Duration,
    ) -> Result<Response> {
        let request = self.identify(request);
        let (key, required) = match (wait, request.id()) {
            (Wait::Event(event), _) => (WaitKey::SubEvent(event.to_string()), None),
            (Wait::SubEvent(event), Some(id)) => (WaitKey::Id(id.to_string()), Some(event)),
            (_, id) => (WaitKey::Id(id.unwrap_or_default().to_string()), None),
        };

        // registered before sending so a fast reply cannot be missed
        let rx = self.pending.register(key.clone(), required)?;
        if let Err(e) = self.send(&request).await {
            self.pending.remove(&key);
            return Err(e);
        }
        self.await_reply(request.name(), &key, rx, limit).await
    }

    /// Wait on a receiver registered earlier
    pub async fn await_reply(
        &self,
        request: &str,
        key: &WaitKey,
        rx: oneshot::Receiver<Response>,
        limit: Duration,
    ) -> Result<Response> {
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(response)) => check_reply(response, request),
            Ok(Err(_)) => Err(ConnectionError::Closed.into()),
            Err(_) => {
                self.pending.remove(key);
                log::debug!("No reply to `{}` on {} within {:?}", request, key, limit);
                Err(Error::no_response(request))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_by_request_id_then_id() {
        let table = PendingTable::new();
        let mut a = table.register(WaitKey::Id("a".into()), None).unwrap();
        let mut b = table.register(WaitKey::Id("b".into()), None).unwrap();

        assert!(table.dispatch(&json!({"id": "b", "event": "x"}), None));
        assert!(table.dispatch(&json!({"request_id": "a", "id": "zzz"}), None));
        assert!(table.is_empty());

        assert_eq!(b.try_recv().unwrap().payload["event"], "x");
        assert_eq!(a.try_recv().unwrap().payload["request_id"], "a");
    }

    #[test]
    fn mismatching_sub_event_keeps_waiting() {
        let table = PendingTable::new();
        let mut rx = table
            .register(WaitKey::Id("u".into()), Some("image_added"))
            .unwrap();

        assert!(!table.dispatch(&json!({"id": "u", "event": "ready_to_use"}), None));
        assert_eq!(table.len(), 1);
        assert!(rx.try_recv().is_err());

        assert!(table.dispatch(&json!({"id": "u", "event": "image_added"}), None));
        assert_eq!(rx.try_recv().unwrap().sub_event(), "image_added");
    }

    #[test]
    fn error_resolves_sub_event_waiter() {
        let table = PendingTable::new();
        let mut rx = table
            .register(WaitKey::Id("u".into()), Some("ready_to_use"))
            .unwrap();
        assert!(table.dispatch(&json!({"id": "u", "event": "error", "error_code": -1}), None));

        let e = check_reply(rx.try_recv().unwrap(), "send_image").unwrap_err();
        assert!(e.is_request_failed());
        let message = e.to_string();
        assert!(message.contains("send_image"));
        assert!(message.contains("-1"));
    }

    #[test]
    fn sub_event_key_fallback() {
        let table = PendingTable::new();
        let mut rx = table
            .register(WaitKey::SubEvent("favorite_changed".into()), None)
            .unwrap();
        assert!(!table.dispatch(&json!({"event": "art_mode_changed"}), None));
        assert!(table.dispatch(&json!({"event": "favorite_changed", "status": "on"}), None));
        assert_eq!(rx.try_recv().unwrap().payload["status"], "on");
    }

    #[test]
    fn lock_step_id_match() {
        let req = "get_content_list";
        assert!(reply_matches(&json!({"id": "u"}), "u", req, None));
        assert!(reply_matches(&json!({"request_id": "v", "id": "u"}), "u", req, None));
        assert!(!reply_matches(&json!({"id": "v"}), "u", req, None));
    }

    #[test]
    fn lock_step_without_id() {
        let req = "get_content_list";
        assert!(reply_matches(&json!({"event": "get_content_list"}), "u", req, None));
        let ready = json!({"event": "ready_to_use"});
        assert!(reply_matches(&ready, "u", "get_thumbnail", Some("ready_to_use")));

        for status in &["go_to_standby", "art_mode_changed", "wakeup", "artmode_status"] {
            assert!(!reply_matches(&json!({"event": status}), "u", req, None));
        }

        let ours = json!({"event": "error", "request_data": {"request": "get_content_list"}});
        let theirs = json!({"event": "error", "request_data": "{\"request\":\"set_brightness\"}"});
        assert!(reply_matches(&ours, "u", req, None));
        assert!(!reply_matches(&theirs, "u", req, None));
        assert!(!reply_matches(&json!({"event": "error"}), "u", req, None));
    }

    #[test]
    fn one_live_waiter_per_key() {
        let table = PendingTable::new();
        let rx = table.register(WaitKey::Id("u".into()), None).unwrap();
        let e = table.register(WaitKey::Id("u".into()), None).unwrap_err();
        assert!(e.is_client());

        drop(rx);
        assert!(table.register(WaitKey::Id("u".into()), None).is_ok());
    }

    #[test]
    fn cancel_all_closes_waiters() {
        let table = PendingTable::new();
        let mut rx = table.register(WaitKey::Id("u".into()), None).unwrap();
        table.cancel_all();
        assert!(table.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn request_name_from_echoed_data() {
        let echoed = json!({"request": "get_brightness", "id": "u"}).to_string();
        let response = Response::new(json!({
            "event": "error",
            "request_data": echoed,
            "error_code": "-7",
        }));
        let e = check_reply(response, "get_artmode_settings").unwrap_err();
        assert_eq!(e.error_code(), Some("-7"));
        assert!(e.to_string().contains("get_brightness"));

        let response = Response::new(json!({
            "event": "error",
            "request_data": {"request": "select_image"},
            "error_code": 5,
        }));
        assert!(check_reply(response, "x").unwrap_err().to_string().contains("select_image"));

        let ok = Response::new(json!({"event": "ms.channel.emit_ack"}));
        assert!(check_reply(ok, "set_artmode_status").is_ok());
    }
}
