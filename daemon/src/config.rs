//! Configuration loading and management
//!
//! Defaults first, then the optional TOML file, then environment overrides.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::ptz::{default_bindings, Binding, DEFAULT_SETTLE_DELAY_MS};
use crate::voice::VoiceConfig;

const CONFIG_ENV: &str = "PTZ_VOICE_CONFIG";
const API_BASE_ENV: &str = "PTZ_VOICE_API_BASE";
const SOCKET_ENV: &str = "PTZ_VOICE_SOCKET";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub control: ControlConfig,
    pub ptz: PtzConfig,
    pub voice: VoiceConfig,
}

/// `[control]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Base URL of the camera control server
    pub base_url: String,
    pub timeout_ms: u64,
    pub status_poll_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_ms: 5000,
            status_poll_ms: 1000,
        }
    }
}

impl ControlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }
}

/// `[ptz]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PtzConfig {
    /// Delay between a click's release and its step command
    pub settle_delay_ms: u64,
    pub bindings: Vec<Binding>,
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            bindings: default_bindings(),
        }
    }
}

impl PtzConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// On-disk layout; everything optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    socket_path: Option<PathBuf>,
    control: ControlConfig,
    ptz: PtzConfig,
    voice: VoiceConfig,
}

impl Config {
    /// Load configuration from defaults, the config file and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("ptz-voice");

        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if path.exists() {
            debug!(path = %path.display(), "reading config file");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::from_toml_str(&text, data_dir)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            Self::from_toml_str("", data_dir)?
        };

        if let Ok(base) = std::env::var(API_BASE_ENV) {
            config.control.base_url = base;
        }
        if let Some(socket) = std::env::var_os(SOCKET_ENV) {
            config.socket_path = PathBuf::from(socket);
        }

        Ok(config)
    }

    /// Build a config from TOML text, rooted at `data_dir`
    pub fn from_toml_str(text: &str, data_dir: PathBuf) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).context("failed to parse config")?;

        let mut ids = HashSet::new();
        for binding in &file.ptz.bindings {
            if !ids.insert(binding.id.as_str()) {
                bail!("duplicate binding id {:?} in [[ptz.bindings]]", binding.id);
            }
        }

        let socket_path = file
            .socket_path
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        Ok(Self {
            socket_path,
            data_dir,
            control: file.control,
            ptz: file.ptz,
            voice: file.voice,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        if let Some(parent) = self.socket_path.parent().filter(|p| *p != Path::new("")) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Axis, DeviceCommand, Direction};

    fn data_dir() -> PathBuf {
        PathBuf::from("/tmp/ptz-voice-test")
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("", data_dir()).unwrap();
        assert_eq!(config.socket_path, data_dir().join("daemon.sock"));
        assert_eq!(config.control.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.control.status_interval(), Duration::from_secs(1));
        assert_eq!(config.ptz.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.ptz.bindings.len(), 6);
        assert_eq!(config.voice.pulse_ms, 2500);
        assert!(config.voice.player.is_empty());
    }

    #[test]
    fn test_sections_override_defaults() {
        let text = r#"
            socket_path = "/run/ptz.sock"

            [control]
            base_url = "http://camera.local:8080"

            [voice]
            pulse_ms = 1000
            player = ["mpv", "-"]

            [voice.phrases]
            wake = ["jarvis"]

            [voice.brightness]
            max = 80
        "#;
        let config = Config::from_toml_str(text, data_dir()).unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/ptz.sock"));
        assert_eq!(config.control.base_url, "http://camera.local:8080");
        assert_eq!(config.control.timeout_ms, 5000);
        assert_eq!(config.voice.pulse_ms, 1000);
        assert_eq!(config.voice.player, vec!["mpv".to_string(), "-".to_string()]);
        assert_eq!(config.voice.phrases.wake, vec!["jarvis".to_string()]);
        assert!(!config.voice.phrases.vision.is_empty());
        assert_eq!(config.voice.brightness.max, 80);
        assert_eq!(config.voice.brightness.min, 7);
        assert_eq!(config.voice.brightness.default, 40);
    }

    #[test]
    fn test_custom_bindings_replace_defaults() {
        let text = r#"
            [ptz]
            settle_delay_ms = 0

            [[ptz.bindings]]
            id = "tiltUp"
            start = "/ptz/pan/start/left"
            hold_threshold_ms = 400
        "#;
        let config = Config::from_toml_str(text, data_dir()).unwrap();

        assert_eq!(config.ptz.settle_delay_ms, 0);
        assert_eq!(config.ptz.bindings.len(), 1);
        let binding = &config.ptz.bindings[0];
        assert_eq!(
            binding.start,
            DeviceCommand::Start { axis: Axis::Pan, direction: Direction::Left }
        );
        assert_eq!(binding.stop, None);
        assert_eq!(binding.hold_threshold_ms, 400);
    }

    #[test]
    fn test_rejects_bad_command_path() {
        let text = r#"
            [[ptz.bindings]]
            id = "broken"
            start = "/ptz/zoom/start/left"
        "#;
        assert!(Config::from_toml_str(text, data_dir()).is_err());
    }

    #[test]
    fn test_rejects_duplicate_binding_ids() {
        let text = r#"
            [[ptz.bindings]]
            id = "zoomIn"
            start = "/ptz/zoom/start/in"

            [[ptz.bindings]]
            id = "zoomIn"
            start = "/ptz/zoom/start/out"
        "#;
        let err = Config::from_toml_str(text, data_dir()).unwrap_err();
        assert!(err.to_string().contains("duplicate binding id"));
    }

    #[test]
    fn test_rejects_unknown_top_level_key() {
        assert!(Config::from_toml_str("sockets = 1", data_dir()).is_err());
    }
}
