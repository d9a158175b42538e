use serde_json::{Map, Value};

use crate::error::BridgeError;

/// Envelope `type` carried by player telemetry.
pub const PLAYER_EVENT_TYPE: &str = "PLAYER_EVENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEventKind {
    TimeUpdate,
    Play,
    Pause,
    Seeked,
    Ended,
    Complete,
    Other(String),
}

impl PlayerEventKind {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "timeupdate" | "time" => Self::TimeUpdate,
            "play" | "playing" => Self::Play,
            "pause" => Self::Pause,
            "seeked" | "seek" => Self::Seeked,
            "ended" => Self::Ended,
            "complete" => Self::Complete,
            _ => Self::Other(raw.to_string()),
        }
    }
}

/// Telemetry unwrapped from a `PLAYER_EVENT` envelope.
///
/// Every field is optional: players disagree on what they send, and a field
/// with the wrong shape is dropped on its own without rejecting the event.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub kind: Option<PlayerEventKind>,
    /// Playback position in seconds.
    pub current_time: Option<f64>,
    /// Episode length in seconds.
    pub duration: Option<f64>,
    pub episode: Option<u32>,
    pub muted: Option<bool>,
    /// The unwrapped `data` payload as received.
    pub data: Value,
}

impl PlayerEvent {
    /// Seconds left in the episode, when both position and length are known.
    pub fn remaining(&self) -> Option<f64> {
        match (self.current_time, self.duration) {
            (Some(time), Some(duration)) if duration > 0.0 => Some((duration - time).max(0.0)),
            _ => None,
        }
    }

    pub fn is_near_end(&self, threshold_secs: f64) -> bool {
        matches!(self.kind, Some(PlayerEventKind::Ended | PlayerEventKind::Complete))
            || self.remaining().is_some_and(|left| left <= threshold_secs)
    }

    fn from_data(data: Value) -> Self {
        let fields = data.as_object();
        let get = |keys: &[&str]| -> Option<&Value> {
            let fields = fields?;
            keys.iter().find_map(|key| fields.get(*key))
        };
        Self {
            kind: get(&["event", "type"])
                .and_then(Value::as_str)
                .map(PlayerEventKind::parse),
            current_time: get(&["currentTime", "current_time", "time"]).and_then(number),
            duration: get(&["duration"]).and_then(number),
            episode: get(&["episode"])
                .and_then(number)
                .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX))
                .map(|n| n as u32),
            muted: get(&["muted"]).and_then(Value::as_bool),
            data,
        }
    }
}

/// Unwrap a raw message into a [`PlayerEvent`].
///
/// The message, and separately its `data`, may arrive either as an object or
/// as a JSON-encoded string.
pub fn decode_envelope(message: &Value) -> Result<PlayerEvent, BridgeError> {
    let envelope = as_object(message)?;
    if envelope.get("type").and_then(Value::as_str) != Some(PLAYER_EVENT_TYPE) {
        return Err(BridgeError::NotPlayerEvent);
    }
    let data = match envelope.get("data") {
        None | Some(Value::Null) => return Err(BridgeError::MissingData),
        Some(Value::String(text)) => serde_json::from_str(text)
            .map_err(|e| BridgeError::Malformed(format!("data is not JSON: {e}")))?,
        Some(other) => other.clone(),
    };
    Ok(PlayerEvent::from_data(data))
}

fn as_object(message: &Value) -> Result<Map<String, Value>, BridgeError> {
    match message {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BridgeError::Malformed("message is not an object".into())),
            Err(e) => Err(BridgeError::Malformed(e.to_string())),
        },
        _ => Err(BridgeError::Malformed("message is not an object".into())),
    }
}

/// Numbers, or strings holding numbers.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
