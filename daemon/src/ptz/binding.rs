//! Button bindings and per-press session state

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::control::{Axis, DeviceCommand, Direction};

/// Presses shorter than this are clicks
pub const DEFAULT_HOLD_THRESHOLD_MS: u64 = 250;

fn default_hold_threshold_ms() -> u64 {
    DEFAULT_HOLD_THRESHOLD_MS
}

/// One controllable button and the commands it drives
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Binding {
    /// Opaque button id used by the UI
    pub id: String,
    /// Begin continuous movement once the press becomes a hold
    pub start: DeviceCommand,
    /// End continuous movement when the hold is released
    #[serde(default)]
    pub stop: Option<DeviceCommand>,
    /// Single step for a quick click
    #[serde(default)]
    pub step: Option<DeviceCommand>,
    #[serde(default = "default_hold_threshold_ms")]
    pub hold_threshold_ms: u64,
}

impl Binding {
    /// Binding with the standard start/stop/step triple for one axis direction
    pub fn for_axis(id: &str, axis: Axis, direction: Direction) -> Self {
        Self {
            id: id.to_string(),
            start: DeviceCommand::Start { axis, direction },
            stop: Some(DeviceCommand::Stop { axis }),
            step: Some(DeviceCommand::Step { axis, direction }),
            hold_threshold_ms: DEFAULT_HOLD_THRESHOLD_MS,
        }
    }
}

/// The control surface the web UI ships with
pub fn default_bindings() -> Vec<Binding> {
    vec![
        Binding::for_axis("ptzUp", Axis::Focus, Direction::In),
        Binding::for_axis("ptzDown", Axis::Focus, Direction::Out),
        Binding::for_axis("ptzLeft", Axis::Pan, Direction::Left),
        Binding::for_axis("ptzRight", Axis::Pan, Direction::Right),
        Binding::for_axis("zoomIn", Axis::Zoom, Direction::In),
        Binding::for_axis("zoomOut", Axis::Zoom, Direction::Out),
    ]
}

/// Live state of one press, dropped on release or cancel
#[derive(Debug, Default)]
pub(crate) struct PressSession {
    pub pressed: bool,
    pub holding: bool,
    /// Hold-threshold timer, present only while pressed and not yet holding
    pub pending: Option<JoinHandle<()>>,
    /// Distinguishes this press from earlier ones on the same binding
    pub generation: u64,
    pub hold_started_at: Option<Instant>,
}

impl PressSession {
    pub fn pressed(generation: u64) -> Self {
        Self {
            pressed: true,
            holding: false,
            pending: None,
            generation,
            hold_started_at: None,
        }
    }

    /// Abort the hold-threshold timer if it is still armed
    pub fn disarm(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }
}

impl Drop for PressSession {
    fn drop(&mut self) {
        self.disarm();
    }
}
