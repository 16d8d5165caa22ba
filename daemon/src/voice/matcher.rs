//! Local keyword command matcher
//!
//! Fallback used when the remote interpreter is missing or fails. Keyword
//! groups are tested in a fixed order (stop, zoom, focus, pan, brightness)
//! and the first group whose trigger appears wins. Keywords match the
//! start of a word, so "zooming" reads as "zoom" while "brighter" never
//! reads as "right".

use serde::Deserialize;

use crate::control::{Axis, DeviceCommand, Direction};

const STOP_WORDS: &[&str] = &["stop"];
const BRIGHTNESS_TRIGGERS: &[&str] = &["brightness", "brighter", "darker"];
const BRIGHTNESS_UP: &[&str] = &["up", "brighter", "increase"];
const BRIGHTNESS_DOWN: &[&str] = &["down", "darker", "decrease"];

struct AxisGroup {
    axis: Axis,
    label: &'static str,
    triggers: &'static [&'static str],
    /// "A little" selects a step instead of a timed pulse
    small: &'static [&'static str],
    directions: [(Direction, &'static [&'static str]); 2],
}

const AXIS_GROUPS: [AxisGroup; 3] = [
    AxisGroup {
        axis: Axis::Zoom,
        label: "Zoom",
        triggers: &["zoom"],
        small: &["little", "bit"],
        directions: [
            (Direction::In, &["in", "plus", "closer"]),
            (Direction::Out, &["out", "minus", "back"]),
        ],
    },
    AxisGroup {
        axis: Axis::Focus,
        label: "Focus",
        triggers: &["focus"],
        small: &["little", "bit", "detail"],
        directions: [
            (Direction::In, &["in", "near", "closer"]),
            (Direction::Out, &["out", "far", "away"]),
        ],
    },
    AxisGroup {
        axis: Axis::Pan,
        label: "Pan",
        triggers: &["pan", "left", "right"],
        small: &["little", "bit"],
        directions: [
            (Direction::Left, &["left"]),
            (Direction::Right, &["right", "ban rate", "bandrate", "pan write"]),
        ],
    },
];

/// Range and increment for spoken brightness changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrightnessLimits {
    pub min: u8,
    pub max: u8,
    pub step: u8,
    /// Assumed current value while the device state is unknown
    pub default: u8,
}

impl Default for BrightnessLimits {
    fn default() -> Self {
        Self { min: 7, max: 60, step: 5, default: 40 }
    }
}

/// What a matched utterance asks the device to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    StopAll,
    Step(DeviceCommand),
    /// Start now, stop unconditionally after the pulse duration
    Pulse { start: DeviceCommand, stop: DeviceCommand },
    SetBrightness(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMatch {
    pub action: LocalAction,
    /// Short description for the presentation layer
    pub label: String,
}

struct Words<'a>(Vec<&'a str>);

impl<'a> Words<'a> {
    fn new(text: &'a str) -> Self {
        Self(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    /// Whether `keyword` (one or more words) begins consecutive words
    fn mentions(&self, keyword: &str) -> bool {
        let needle: Vec<&str> = keyword.split_whitespace().collect();
        if needle.is_empty() {
            return false;
        }
        self.0.windows(needle.len()).any(|window| {
            window
                .iter()
                .zip(&needle)
                .all(|(word, prefix)| word.starts_with(prefix))
        })
    }

    fn mentions_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.mentions(k))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandMatcher {
    brightness: BrightnessLimits,
}

impl CommandMatcher {
    pub fn new(brightness: BrightnessLimits) -> Self {
        Self { brightness }
    }

    /// Map an utterance to a device action, `None` if nothing applies
    pub fn match_command(&self, text: &str, current_brightness: u8) -> Option<LocalMatch> {
        let words = Words::new(text);

        if words.mentions_any(STOP_WORDS) {
            return Some(LocalMatch { action: LocalAction::StopAll, label: "Stop".into() });
        }

        if let Some(group) = AXIS_GROUPS.iter().find(|g| words.mentions_any(g.triggers)) {
            return Self::match_axis(group, &words);
        }

        if words.mentions_any(BRIGHTNESS_TRIGGERS) {
            return self.match_brightness(&words, current_brightness);
        }

        None
    }

    fn match_axis(group: &AxisGroup, words: &Words<'_>) -> Option<LocalMatch> {
        let (direction, _) = group
            .directions
            .iter()
            .find(|(_, keywords)| words.mentions_any(keywords))?;
        let direction = *direction;
        let axis = group.axis;

        let m = if words.mentions_any(group.small) {
            LocalMatch {
                action: LocalAction::Step(DeviceCommand::Step { axis, direction }),
                label: format!("{} {} (step)", group.label, direction),
            }
        } else {
            LocalMatch {
                action: LocalAction::Pulse {
                    start: DeviceCommand::Start { axis, direction },
                    stop: DeviceCommand::Stop { axis },
                },
                label: format!("{} {}", group.label, direction),
            }
        };
        Some(m)
    }

    fn match_brightness(&self, words: &Words<'_>, current: u8) -> Option<LocalMatch> {
        let limits = self.brightness;
        let target = if words.mentions_any(BRIGHTNESS_UP) {
            current.saturating_add(limits.step)
        } else if words.mentions_any(BRIGHTNESS_DOWN) {
            current.saturating_sub(limits.step)
        } else {
            return None;
        };
        let value = target.clamp(limits.min, limits.max);

        Some(LocalMatch {
            action: LocalAction::SetBrightness(value),
            label: format!("Brightness: {}", value),
        })
    }
}
