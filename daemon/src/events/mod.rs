//! Events module for assistant state transitions
//!
//! Every hook the presentation layer cares about (gesture holds, wake
//! detection, command outcomes, recognizer control) is published as an
//! `AssistantEvent` on a broadcast channel. The IPC server forwards them
//! to subscribed clients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::voice::VoiceState;

/// Number of IPC clients currently subscribed to events
#[derive(Debug, Clone, Default)]
pub struct Subscribers(Arc<AtomicUsize>);

impl Subscribers {
    /// Count a subscriber until the returned guard is dropped
    pub fn register(&self) -> SubscriberGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        SubscriberGuard(Arc::clone(&self.0))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SubscriberGuard(Arc<AtomicUsize>);

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Events emitted by the gesture dispatcher and voice pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// A press crossed the hold threshold and continuous movement began
    HoldStarted { binding: String },

    /// A hold was released
    HoldStopped {
        binding: String,
        /// How long continuous movement ran
        duration_ms: u64,
    },

    /// A quick click issued a single step
    Stepped { binding: String },

    /// A press left its control before release
    PressCancelled { binding: String },

    /// Global stop issued on every axis
    StoppedAll,

    /// Voice control switched on (recognizer armed)
    VoiceEnabled,

    /// Voice control switched off
    VoiceDisabled,

    /// Wake phrase heard, accepting commands
    WakeDetected,

    /// Deactivation phrase heard, back to waiting for the wake phrase
    Deactivated,

    /// An utterance was accepted for dispatch
    CommandHeard { text: String },

    /// Text produced by the remote assistant
    AssistantSaid { text: String },

    CommandExecuted { action: String, success: bool },

    /// No local command matched the utterance
    CommandUnknown { text: String },

    CommandError { message: String },

    /// Synthesized speech playback began
    SpeakingStarted,

    SpeakingFinished,

    /// The speech recognizer should be started or stopped
    RecognitionRequested { active: bool },

    /// Voice pipeline moved between states
    VoiceStateChanged { from: VoiceState, to: VoiceState },
}

impl std::fmt::Display for AssistantEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssistantEvent::HoldStarted { binding } => write!(f, "HOLD_STARTED ({})", binding),
            AssistantEvent::HoldStopped { binding, duration_ms } => {
                write!(f, "HOLD_STOPPED ({}, {}ms)", binding, duration_ms)
            }
            AssistantEvent::Stepped { binding } => write!(f, "STEPPED ({})", binding),
            AssistantEvent::PressCancelled { binding } => {
                write!(f, "PRESS_CANCELLED ({})", binding)
            }
            AssistantEvent::StoppedAll => write!(f, "STOPPED_ALL"),
            AssistantEvent::VoiceEnabled => write!(f, "VOICE_ENABLED"),
            AssistantEvent::VoiceDisabled => write!(f, "VOICE_DISABLED"),
            AssistantEvent::WakeDetected => write!(f, "WAKE_DETECTED"),
            AssistantEvent::Deactivated => write!(f, "DEACTIVATED"),
            AssistantEvent::CommandHeard { text } => write!(f, "COMMAND_HEARD ({:?})", text),
            AssistantEvent::AssistantSaid { text } => write!(f, "ASSISTANT_SAID ({:?})", text),
            AssistantEvent::CommandExecuted { action, success } => {
                write!(f, "COMMAND_EXECUTED ({}, success={})", action, success)
            }
            AssistantEvent::CommandUnknown { text } => write!(f, "COMMAND_UNKNOWN ({:?})", text),
            AssistantEvent::CommandError { message } => write!(f, "COMMAND_ERROR ({})", message),
            AssistantEvent::SpeakingStarted => write!(f, "SPEAKING_STARTED"),
            AssistantEvent::SpeakingFinished => write!(f, "SPEAKING_FINISHED"),
            AssistantEvent::RecognitionRequested { active } => {
                write!(f, "RECOGNITION_REQUESTED (active={})", active)
            }
            AssistantEvent::VoiceStateChanged { from, to } => {
                write!(f, "VOICE_STATE_CHANGED ({} -> {})", from, to)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AssistantEvent::HoldStopped { binding: "zoomIn".into(), duration_ms: 1500 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("hold_stopped"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"wake_detected"}"#;
        let event: AssistantEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AssistantEvent::WakeDetected);
    }

    #[test]
    fn test_display() {
        let event = AssistantEvent::CommandExecuted { action: "Zoom in".into(), success: true };
        assert_eq!(event.to_string(), "COMMAND_EXECUTED (Zoom in, success=true)");

        let event = AssistantEvent::VoiceStateChanged {
            from: VoiceState::Armed,
            to: VoiceState::Listening,
        };
        assert_eq!(event.to_string(), "VOICE_STATE_CHANGED (Armed -> Listening)");
    }

    #[test]
    fn test_subscriber_guard_counts() {
        let subscribers = Subscribers::default();
        assert_eq!(subscribers.count(), 0);

        let first = subscribers.register();
        let second = subscribers.clone().register();
        assert_eq!(subscribers.count(), 2);

        drop(first);
        assert_eq!(subscribers.count(), 1);
        drop(second);
        assert_eq!(subscribers.count(), 0);
    }

    #[test]
    fn test_voice_state_changed_wire_format() {
        let event = AssistantEvent::VoiceStateChanged {
            from: VoiceState::Listening,
            to: VoiceState::Dispatching,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "voice_state_changed", "from": "listening", "to": "dispatching"})
        );
    }
}
