//! Voice command module
//!
//! Gates a continuous transcript stream behind a wake phrase, routes
//! accepted utterances to the remote vision or command interpreter, and
//! falls back to a local keyword matcher when the interpreter is missing
//! or fails.

mod matcher;
mod phrases;
mod pipeline;
mod playback;
mod recognizer;

use serde::Deserialize;

use matcher::BrightnessLimits;
use phrases::PhraseSet;

pub use pipeline::{VoiceInput, VoicePipeline, VoiceState};
pub use playback::{AudioPlayer, CommandPlayer, NullPlayer};
pub use recognizer::RemoteRecognizer;

/// `[voice]` section of the config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub phrases: PhraseSet,
    pub brightness: BrightnessLimits,
    /// Duration of a spoken "zoom in" style movement
    pub pulse_ms: u64,
    /// Delay before restarting a recognizer that ended on its own
    pub restart_delay_ms: u64,
    /// Delay after speech playback before listening again
    pub resume_delay_ms: u64,
    /// External player command line, e.g. `["mpv", "--no-video", "-"]`
    pub player: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            phrases: PhraseSet::default(),
            brightness: BrightnessLimits::default(),
            pulse_ms: 2500,
            restart_delay_ms: 100,
            resume_delay_ms: 500,
            player: Vec::new(),
        }
    }
}
