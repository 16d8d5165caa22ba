//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::control::{DeviceCommand, Histogram};
use crate::events::AssistantEvent;
use crate::status::DeviceSnapshot;
use crate::voice::VoiceState;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to assistant event notifications
    Subscribe,

    /// Pointer down on a PTZ button
    Press { binding: String },

    /// Pointer up on a PTZ button
    Release { binding: String },

    /// Pointer left a PTZ button while pressed
    Cancel { binding: String },

    /// Stop movement on every axis
    StopAll,

    SetVoiceEnabled { enabled: bool },

    /// Final result from the UI's speech recognizer
    Transcript { text: String },

    /// The recognizer stopped on its own
    RecognitionEnded,

    /// Recognizer error code such as `no-speech` or `not-allowed`
    RecognitionError { error: String },

    /// Forward a single command to the control server
    SendCommand { command: DeviceCommand },

    /// Fetch the current luminance histogram
    GetHistogram,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Input queued for the dispatcher or voice pipeline
    Accepted,

    Histogram(Histogram),

    CommandResult { ok: bool, message: Option<String> },

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: AssistantEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub voice_state: VoiceState,

    /// Last polled control server state
    pub device: DeviceSnapshot,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            voice_state: VoiceState::default(),
            device: DeviceSnapshot::default(),
            uptime_secs: 0,
        }
    }
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error { code: code.to_string(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Axis, Direction};
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = Request::Press { binding: "zoomIn".into() };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, json!({"type": "press", "binding": "zoomIn"}));
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request =
            serde_json::from_str(r#"{"type":"set_voice_enabled","enabled":true}"#).unwrap();
        assert_eq!(req, Request::SetVoiceEnabled { enabled: true });

        let req: Request =
            serde_json::from_str(r#"{"type":"send_command","command":"/zoom/in"}"#).unwrap();
        assert_eq!(
            req,
            Request::SendCommand {
                command: DeviceCommand::Step { axis: Axis::Zoom, direction: Direction::In }
            }
        );

        let bad = serde_json::from_str::<Request>(r#"{"type":"send_command","command":"/nope"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["voice_state"], "off");
        assert_eq!(json["device"]["reachable"], false);
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event { event: AssistantEvent::WakeDetected };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json, json!({"type": "event", "event": {"type": "wake_detected"}}));
    }
}
