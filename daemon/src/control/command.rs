//! Device command model
//!
//! Every movement or adjustment the daemon can ask of the control server
//! is a `DeviceCommand`. Each command maps to exactly one POST path, and
//! the path string doubles as the command's serialized form so bindings
//! in the config file read the same as the server routes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A controllable PTZ axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Zoom,
    Focus,
    Pan,
}

impl Axis {
    fn as_str(self) -> &'static str {
        match self {
            Axis::Zoom => "zoom",
            Axis::Focus => "focus",
            Axis::Pan => "pan",
        }
    }

    /// Whether `direction` is meaningful on this axis
    pub fn accepts(self, direction: Direction) -> bool {
        match self {
            Axis::Zoom | Axis::Focus => matches!(direction, Direction::In | Direction::Out),
            Axis::Pan => matches!(direction, Direction::Left | Direction::Right),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement direction along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    Left,
    Right,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request to the control server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceCommand {
    /// Begin continuous movement
    Start { axis: Axis, direction: Direction },
    /// End continuous movement on one axis
    Stop { axis: Axis },
    /// Move by one discrete unit
    Step { axis: Axis, direction: Direction },
    /// Halt every axis
    StopAll,
    /// Absolute brightness
    SetBrightness(u8),
    SetAutoCorrections(bool),
    /// Flip the denoise filter on or off
    ToggleDenoise,
    SetHorizontalFlip(bool),
}

impl DeviceCommand {
    /// POST path on the control server
    pub fn path(&self) -> String {
        match *self {
            DeviceCommand::Start { axis, direction } => {
                format!("/ptz/{}/start/{}", axis, direction)
            }
            DeviceCommand::Stop { axis } => format!("/ptz/{}/stop", axis),
            DeviceCommand::Step { axis: Axis::Zoom, direction } => format!("/zoom/{}", direction),
            DeviceCommand::Step { axis: Axis::Focus, direction } => {
                format!("/ptz/focus/step/{}", direction)
            }
            DeviceCommand::Step { axis: Axis::Pan, direction } => format!("/ptz/{}", direction),
            DeviceCommand::StopAll => "/ptz/stop".to_string(),
            DeviceCommand::SetBrightness(value) => format!("/brightness/{}", value),
            DeviceCommand::SetAutoCorrections(on) => format!("/auto_corrections/{}", on),
            DeviceCommand::ToggleDenoise => "/corrections/toggle/nlm".to_string(),
            DeviceCommand::SetHorizontalFlip(on) => format!("/horizontal_flip/{}", on),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Errors from parsing a command path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unrecognized command path: {0}")]
    UnknownPath(String),

    #[error("{axis} cannot move {direction}")]
    InvalidDirection { axis: Axis, direction: Direction },

    #[error("invalid value in command path: {0}")]
    InvalidValue(String),
}

fn checked(axis: Axis, direction: Direction) -> Result<(Axis, Direction), CommandParseError> {
    if axis.accepts(direction) {
        Ok((axis, direction))
    } else {
        Err(CommandParseError::InvalidDirection { axis, direction })
    }
}

fn parse_axis(s: &str) -> Option<Axis> {
    match s {
        "zoom" => Some(Axis::Zoom),
        "focus" => Some(Axis::Focus),
        "pan" => Some(Axis::Pan),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Result<bool, CommandParseError> {
    s.parse()
        .map_err(|_| CommandParseError::InvalidValue(s.to_string()))
}

impl FromStr for DeviceCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        let unknown = || CommandParseError::UnknownPath(s.to_string());

        let command = match segments.as_slice() {
            ["ptz", "stop"] => DeviceCommand::StopAll,
            ["ptz", axis, "start", dir] => {
                let axis = parse_axis(axis).ok_or_else(unknown)?;
                let direction = Direction::parse(dir).ok_or_else(unknown)?;
                let (axis, direction) = checked(axis, direction)?;
                DeviceCommand::Start { axis, direction }
            }
            ["ptz", axis, "stop"] => DeviceCommand::Stop {
                axis: parse_axis(axis).ok_or_else(unknown)?,
            },
            ["ptz", "focus", "step", dir] => {
                let direction = Direction::parse(dir).ok_or_else(unknown)?;
                let (axis, direction) = checked(Axis::Focus, direction)?;
                DeviceCommand::Step { axis, direction }
            }
            ["zoom", dir] => {
                let direction = Direction::parse(dir).ok_or_else(unknown)?;
                let (axis, direction) = checked(Axis::Zoom, direction)?;
                DeviceCommand::Step { axis, direction }
            }
            ["ptz", dir] => {
                let direction = Direction::parse(dir).ok_or_else(unknown)?;
                let (axis, direction) = checked(Axis::Pan, direction)?;
                DeviceCommand::Step { axis, direction }
            }
            ["brightness", value] => DeviceCommand::SetBrightness(
                value
                    .parse()
                    .map_err(|_| CommandParseError::InvalidValue(value.to_string()))?,
            ),
            ["auto_corrections", on] => DeviceCommand::SetAutoCorrections(parse_bool(on)?),
            ["corrections", "toggle", "nlm"] => DeviceCommand::ToggleDenoise,
            ["horizontal_flip", on] => DeviceCommand::SetHorizontalFlip(parse_bool(on)?),
            _ => return Err(unknown()),
        };

        Ok(command)
    }
}

impl TryFrom<String> for DeviceCommand {
    type Error = CommandParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceCommand> for String {
    fn from(command: DeviceCommand) -> Self {
        command.path()
    }
}
