//! Top level event tags sent by the TV

use super::error::{Error, Result};
use super::frame::Frame;

use serde_json::Value;

pub const D2D_SERVICE_MESSAGE: &str = "d2d_service_message";
pub const ED_APPS_LAUNCH: &str = "ed.apps.launch";
pub const ED_EDENTV_UPDATE: &str = "ed.edenTV.update";
pub const ED_INSTALLED_APP_GET: &str = "ed.installedApp.get";
pub const MS_CHANNEL_CONNECT: &str = "ms.channel.connect";
pub const MS_CHANNEL_CLIENT_CONNECT: &str = "ms.channel.clientConnect";
pub const MS_CHANNEL_CLIENT_DISCONNECT: &str = "ms.channel.clientDisconnect";
pub const MS_CHANNEL_READY: &str = "ms.channel.ready";
pub const MS_CHANNEL_UNAUTHORIZED: &str = "ms.channel.unauthorized";
pub const MS_ERROR: &str = "ms.error";
pub const MS_VOICEAPP_HIDE: &str = "ms.voiceApp.hide";

/// Housekeeping events that may arrive before the connect event
pub const IGNORE_EVENTS_AT_STARTUP: [&str; 2] = [ED_EDENTV_UPDATE, MS_VOICEAPP_HIDE];

const UNSUPPORTED_V2_MESSAGE: &str = "unrecognized method value : ms.remote.control";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Art app traffic carrying a nested payload
    D2dServiceMessage,
    Connect,
    Ready,
    Unauthorized,
    ClientConnect,
    ClientDisconnect,
    Error,
    AppLaunch,
    InstalledApps,
    /// Noise the TV sends on its own
    Housekeeping,
    Other,
}

impl EventKind {
    pub fn from_tag(tag: &str) -> EventKind {
        match tag {
            D2D_SERVICE_MESSAGE => EventKind::D2dServiceMessage,
            MS_CHANNEL_CONNECT => EventKind::Connect,
            MS_CHANNEL_READY => EventKind::Ready,
            MS_CHANNEL_UNAUTHORIZED => EventKind::Unauthorized,
            MS_CHANNEL_CLIENT_CONNECT => EventKind::ClientConnect,
            MS_CHANNEL_CLIENT_DISCONNECT => EventKind::ClientDisconnect,
            MS_ERROR => EventKind::Error,
            ED_APPS_LAUNCH => EventKind::AppLaunch,
            ED_INSTALLED_APP_GET => EventKind::InstalledApps,
            ED_EDENTV_UPDATE | MS_VOICEAPP_HIDE => EventKind::Housekeeping,
            _ => EventKind::Other,
        }
    }

    pub fn of(frame: &Frame) -> EventKind {
        EventKind::from_tag(frame.event())
    }

    pub fn ignored_at_startup(tag: &str) -> bool {
        IGNORE_EVENTS_AT_STARTUP.contains(&tag)
    }
}

/// Turn an `ms.error` frame into [`Error::Message`]
pub fn parse_ms_error(frame: &Frame) -> Error {
    let message = frame.data()["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| frame.json().to_string());
    Error::Message(message)
}

/// True when the TV rejected a v2 remote control message
pub fn is_unsupported_v2(frame: &Frame) -> bool {
    frame.event() == MS_ERROR && frame.data()["message"] == UNSUPPORTED_V2_MESSAGE
}

/// Apps listed in an `ed.installedApp.get` reply
pub fn parse_installed_apps(frame: &Frame) -> Result<Vec<Value>> {
    if frame.event() != ED_INSTALLED_APP_GET {
        return Err(Error::malformed(format!(
            "expected {} event, got {}",
            ED_INSTALLED_APP_GET,
            frame.event()
        )));
    }
    match &frame.data()["data"] {
        Value::Array(apps) => Ok(apps.clone()),
        other => Err(Error::malformed(format!("installed app list: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        assert_eq!(EventKind::from_tag("ms.channel.connect"), EventKind::Connect);
        assert_eq!(
            EventKind::from_tag("d2d_service_message"),
            EventKind::D2dServiceMessage
        );
        assert_eq!(EventKind::from_tag("ms.voiceApp.hide"), EventKind::Housekeeping);
        assert_eq!(EventKind::from_tag("something.new"), EventKind::Other);
        assert!(EventKind::ignored_at_startup("ed.edenTV.update"));
        assert!(!EventKind::ignored_at_startup("ms.channel.ready"));
    }

    #[test]
    fn ms_error() {
        let frame = Frame::from_text(
            r#"{"event":"ms.error","data":{"message":"unrecognized method value : ms.remote.control"}}"#,
        )
        .unwrap();
        assert!(is_unsupported_v2(&frame));
        let e = parse_ms_error(&frame);
        assert!(e.is_message());
        assert!(e.to_string().contains("ms.remote.control"));
    }

    #[test]
    fn installed_apps() {
        let frame = Frame::from_text(
            r#"{"event":"ed.installedApp.get","data":{"data":[{"appId":"111299001912"}]}}"#,
        )
        .unwrap();
        let apps = parse_installed_apps(&frame).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0]["appId"], "111299001912");

        let frame = Frame::from_text(r#"{"event":"ms.channel.ready"}"#).unwrap();
        assert!(parse_installed_apps(&frame).is_err());
    }
}
