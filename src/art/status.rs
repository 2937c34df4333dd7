use serde_json::Value;

/// Cached Art Mode state, updated from unsolicited events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtModeState {
    Unknown,
    On,
    Off,
}

impl Default for ArtModeState {
    fn default() -> Self {
        ArtModeState::Unknown
    }
}

impl ArtModeState {
    fn from_bool(on: bool) -> Self {
        if on {
            ArtModeState::On
        } else {
            ArtModeState::Off
        }
    }

    /// `Some(true)` only when known to be on
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ArtModeState::Unknown => None,
            ArtModeState::On => Some(true),
            ArtModeState::Off => Some(false),
        }
    }
}

/// Sub-events that change the Art Mode state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Reply to a status get or set, or the periodic `artmode_status`
    ArtModeStatus(bool),
    ArtModeChanged(bool),
    GoToStandby,
    Wakeup,
}

impl StatusEvent {
    /// Recognise a nested payload, `None` for anything else
    pub fn recognize(payload: &Value) -> Option<StatusEvent> {
        let event = payload["event"].as_str()?;
        match event {
            "artmode_status" | "get_artmode_status" | "set_artmode_status" => {
                payload["value"].as_str().map(|v| StatusEvent::ArtModeStatus(v == "on"))
            }
            "art_mode_changed" => payload["status"]
                .as_str()
                .map(|v| StatusEvent::ArtModeChanged(v == "on")),
            "go_to_standby" => Some(StatusEvent::GoToStandby),
            "wakeup" | "wake_up" => Some(StatusEvent::Wakeup),
            _ => None,
        }
    }

    /// Update `state`. Returns true when the state must be polled again.
    pub fn apply(self, state: &mut ArtModeState) -> bool {
        match self {
            StatusEvent::ArtModeStatus(on) | StatusEvent::ArtModeChanged(on) => {
                *state = ArtModeState::from_bool(on);
                false
            }
            StatusEvent::GoToStandby => {
                *state = ArtModeState::Off;
                false
            }
            StatusEvent::Wakeup => {
                *state = ArtModeState::Unknown;
                true
            }
        }
    }
}
