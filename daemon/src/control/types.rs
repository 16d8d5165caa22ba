//! Response payloads from the control server

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot returned by `GET /status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceStatus {
    /// Camera is attached and streaming
    pub connected: bool,
    pub brightness: u8,
    /// Active correction profile, `None` in raw mode
    pub profile: Option<String>,
    pub auto_corrections: bool,
    pub horizontal_flip: bool,
    pub zoom_moving: bool,
    pub focus_moving: bool,
    pub pan_moving: bool,
}

/// Per-channel bin counts, 256 bins each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelBins {
    pub r: Vec<f64>,
    pub g: Vec<f64>,
    pub b: Vec<f64>,
}

/// Colour histogram returned by `GET /histogram`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Histogram {
    #[serde(rename = "histogram")]
    pub bins: ChannelBins,
    /// Normalization window bounds
    pub min: f64,
    pub max: f64,
    pub nlm_enabled: bool,
    pub error: Option<String>,
}

/// Reply from the vision and command-interpretation endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantReply {
    /// Structured failure reported by the server
    pub error: Option<String>,
    /// Text to surface to the user
    pub response: Option<String>,
    /// Base64-encoded synthesized speech
    pub audio: Option<String>,
    /// Action to forward to `/robot/execute`
    pub action: Option<String>,
    pub parameters: Option<Value>,
}

/// Reply from `POST /robot/execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteReply {
    pub success: bool,
    pub message: Option<String>,
}

/// Language hint for the vision endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ko")]
    Korean,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Korean => "ko",
        }
    }

    /// Korean if the text contains any Hangul jamo or syllable
    pub fn detect(text: &str) -> Self {
        let hangul = text.chars().any(|c| {
            ('ㄱ'..='ㅎ').contains(&c) || ('ㅏ'..='ㅣ').contains(&c) || ('가'..='힣').contains(&c)
        });
        if hangul {
            Language::Korean
        } else {
            Language::English
        }
    }
}
