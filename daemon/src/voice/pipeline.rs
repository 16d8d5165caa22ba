//! Voice command pipeline
//!
//! State machine over Off, Armed, Listening and Dispatching. A single
//! dispatch runs at a time as a spawned task; utterances that arrive
//! while it is in flight are dropped, not queued. Every dispatch path ends
//! by posting `DispatchFinished`, so the pipeline always returns to
//! listening.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{ControlApi, ControlError, DeviceCommand, Language};
use crate::events::AssistantEvent;
use crate::status::SharedDevice;

use super::matcher::{CommandMatcher, LocalAction};
use super::phrases::{normalize_transcript, PhraseSet};
use super::playback::{decode_speech, AudioPlayer};
use super::recognizer::Recognizer;
use super::VoiceConfig;

/// Input from the UI's speech recognizer and voice toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceInput {
    SetEnabled(bool),
    /// A final recognition result
    Transcript(String),
    /// The recognizer stopped on its own
    RecognitionEnded,
    /// Recognizer error code, e.g. `no-speech` or `not-allowed`
    RecognitionError(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    /// Voice control switched off
    #[default]
    Off,
    /// Recognizer running, waiting for the wake phrase
    Armed,
    /// Accepting commands
    Listening,
    /// A command is in flight
    Dispatching,
}

impl std::fmt::Display for VoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceState::Off => write!(f, "Off"),
            VoiceState::Armed => write!(f, "Armed"),
            VoiceState::Listening => write!(f, "Listening"),
            VoiceState::Dispatching => write!(f, "Dispatching"),
        }
    }
}

/// Messages from spawned tasks back into the pipeline
#[derive(Debug)]
enum Internal {
    DispatchFinished,
    PlaybackStarted,
    PlaybackFinished,
    RestartRecognizer,
    ResumeRecognizer,
}

enum Next {
    Input(VoiceInput),
    Internal(Internal),
}

/// Everything a dispatch task needs, shared with the pipeline
struct DispatchContext {
    client: Arc<dyn ControlApi>,
    player: Arc<dyn AudioPlayer>,
    phrases: PhraseSet,
    matcher: CommandMatcher,
    /// Brightness assumed when the device has not been polled successfully
    fallback_brightness: u8,
    device: SharedDevice,
    pulse: Duration,
    event_tx: broadcast::Sender<AssistantEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

pub struct VoicePipeline {
    /// Recognizer switched on by the user
    enabled: bool,
    /// Wake phrase heard
    listening: bool,
    busy: bool,
    /// Recognizer stopped while speech plays
    paused_for_playback: bool,
    restart_timer: Option<JoinHandle<()>>,
    resume_timer: Option<JoinHandle<()>>,
    restart_delay: Duration,
    resume_delay: Duration,
    recognizer: Arc<dyn Recognizer>,
    ctx: Arc<DispatchContext>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl VoicePipeline {
    pub fn new(
        config: &VoiceConfig,
        client: Arc<dyn ControlApi>,
        player: Arc<dyn AudioPlayer>,
        recognizer: Arc<dyn Recognizer>,
        device: SharedDevice,
        event_tx: broadcast::Sender<AssistantEvent>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let ctx = DispatchContext {
            client,
            player,
            phrases: config.phrases.clone().normalized(),
            matcher: CommandMatcher::new(config.brightness),
            fallback_brightness: config.brightness.default,
            device,
            pulse: Duration::from_millis(config.pulse_ms),
            event_tx,
            internal_tx,
        };

        Self {
            enabled: false,
            listening: false,
            busy: false,
            paused_for_playback: false,
            restart_timer: None,
            resume_timer: None,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            resume_delay: Duration::from_millis(config.resume_delay_ms),
            recognizer,
            ctx: Arc::new(ctx),
            internal_rx,
        }
    }

    pub fn state(&self) -> VoiceState {
        if !self.enabled {
            VoiceState::Off
        } else if !self.listening {
            VoiceState::Armed
        } else if self.busy {
            VoiceState::Dispatching
        } else {
            VoiceState::Listening
        }
    }

    /// Process recognizer input until the input channel closes
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<VoiceInput>) {
        info!("voice pipeline started in Off state");

        loop {
            let next = tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => Next::Input(input),
                    None => break,
                },
                Some(msg) = self.internal_rx.recv() => Next::Internal(msg),
            };

            match next {
                Next::Input(input) => self.handle_input(input),
                Next::Internal(msg) => self.handle_internal(msg),
            }
        }

        self.cancel_timers();
        info!("voice pipeline stopped");
    }

    pub fn handle_input(&mut self, input: VoiceInput) {
        let before = self.state();

        match input {
            VoiceInput::SetEnabled(true) => self.enable(),
            VoiceInput::SetEnabled(false) => self.disable(),
            VoiceInput::Transcript(raw) => self.on_transcript(&raw),
            VoiceInput::RecognitionEnded => self.on_recognition_ended(),
            VoiceInput::RecognitionError(kind) => self.on_recognition_error(&kind),
        }

        self.log_transition(before);
    }

    fn handle_internal(&mut self, msg: Internal) {
        let before = self.state();

        match msg {
            Internal::DispatchFinished => {
                debug!("dispatch finished");
                self.busy = false;
            }
            Internal::PlaybackStarted => {
                self.paused_for_playback = true;
                if let Some(timer) = self.restart_timer.take() {
                    timer.abort();
                }
                if self.enabled {
                    self.recognizer.stop();
                }
            }
            Internal::PlaybackFinished => {
                let timer = self.schedule(self.resume_delay, Internal::ResumeRecognizer);
                if let Some(old) = self.resume_timer.replace(timer) {
                    old.abort();
                }
            }
            Internal::ResumeRecognizer => {
                self.resume_timer = None;
                self.paused_for_playback = false;
                if self.enabled {
                    self.start_recognizer("resume after playback");
                }
            }
            Internal::RestartRecognizer => {
                self.restart_timer = None;
                if self.enabled && !self.paused_for_playback {
                    self.start_recognizer("restart");
                }
            }
        }

        self.log_transition(before);
    }

    fn enable(&mut self) {
        if self.enabled {
            return;
        }
        if let Err(e) = self.recognizer.start() {
            warn!(error = %e, "failed to start recognizer, voice control stays off");
            self.emit(AssistantEvent::CommandError { message: e.to_string() });
            return;
        }

        self.enabled = true;
        self.listening = false;
        self.paused_for_playback = false;
        info!("voice control enabled");
        self.emit(AssistantEvent::VoiceEnabled);
    }

    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.cancel_timers();
        self.recognizer.stop();

        self.enabled = false;
        self.listening = false;
        self.paused_for_playback = false;
        info!("voice control disabled");
        self.emit(AssistantEvent::VoiceDisabled);
    }

    fn on_transcript(&mut self, raw: &str) {
        if !self.enabled {
            debug!("transcript while voice control is off, ignored");
            return;
        }
        let text = normalize_transcript(raw);
        if text.is_empty() {
            return;
        }
        debug!(%text, "heard");

        let phrases = &self.ctx.phrases;
        if phrases.is_wake(&text) {
            if !self.listening {
                self.listening = true;
                info!("wake phrase detected");
                self.emit(AssistantEvent::WakeDetected);
                return;
            }
            if phrases.strip_wake(&text).is_empty() {
                self.emit(AssistantEvent::WakeDetected);
                return;
            }
            // Wake phrase followed by a command while already listening
        }

        if self.listening && phrases.is_deactivate(&text) {
            self.listening = false;
            info!("deactivation phrase detected");
            self.emit(AssistantEvent::Deactivated);
            return;
        }

        if !self.listening {
            debug!(%text, "waiting for wake phrase");
            return;
        }

        if self.busy {
            warn!(%text, "command already in flight, utterance dropped");
            return;
        }

        self.busy = true;
        self.emit(AssistantEvent::CommandHeard { text: text.clone() });

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            ctx.dispatch(&text).await;
            let _ = ctx.internal_tx.send(Internal::DispatchFinished);
        });
    }

    fn on_recognition_ended(&mut self) {
        if !self.enabled || self.paused_for_playback {
            return;
        }
        debug!(delay_ms = self.restart_delay.as_millis() as u64, "recognizer ended, scheduling restart");
        let timer = self.schedule(self.restart_delay, Internal::RestartRecognizer);
        if let Some(old) = self.restart_timer.replace(timer) {
            old.abort();
        }
    }

    fn on_recognition_error(&mut self, kind: &str) {
        match kind {
            "no-speech" => debug!("recognizer heard no speech"),
            "not-allowed" | "service-not-allowed" => {
                warn!(kind, "microphone access denied, disabling voice control");
                self.emit(AssistantEvent::CommandError {
                    message: "microphone access denied".to_string(),
                });
                self.disable();
            }
            other => warn!(kind = other, "recognizer error"),
        }
    }

    fn start_recognizer(&self, reason: &str) {
        match self.recognizer.start() {
            Ok(()) => debug!(reason, "recognizer started"),
            Err(e) => warn!(reason, error = %e, "recognizer start failed"),
        }
    }

    fn schedule(&self, delay: Duration, msg: Internal) -> JoinHandle<()> {
        let tx = self.ctx.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg);
        })
    }

    fn cancel_timers(&mut self) {
        for timer in [self.restart_timer.take(), self.resume_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
    }

    fn log_transition(&self, before: VoiceState) {
        let after = self.state();
        if before != after {
            info!(from = %before, to = %after, "voice state transition");
            self.emit(AssistantEvent::VoiceStateChanged { from: before, to: after });
        }
    }

    fn emit(&self, event: AssistantEvent) {
        let _ = self.ctx.event_tx.send(event);
    }
}

impl DispatchContext {
    async fn dispatch(&self, text: &str) {
        if self.phrases.is_vision(text) {
            self.describe_scene(text).await;
        } else {
            self.run_command(text).await;
        }
    }

    async fn describe_scene(&self, text: &str) {
        let language = Language::detect(text);
        info!(language = language.code(), "vision query");

        match self.client.describe_scene(language).await {
            Ok(reply) => {
                if let Some(error) = reply.error {
                    warn!(%error, "vision query failed");
                    self.emit(AssistantEvent::CommandError { message: error });
                    return;
                }
                if let Some(said) = reply.response {
                    self.emit(AssistantEvent::AssistantSaid { text: said });
                }
                if let Some(audio) = reply.audio {
                    self.speak(&audio).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "vision request failed");
                self.emit(AssistantEvent::CommandError {
                    message: format!("vision analysis failed: {}", e),
                });
            }
        }
    }

    async fn run_command(&self, text: &str) {
        let reply = match self.client.interpret(text).await {
            Ok(reply) => match reply.error {
                Some(ref error) => {
                    warn!(%error, "interpreter reported an error, using local matcher");
                    None
                }
                None => Some(reply),
            },
            Err(ControlError::Unsupported { .. }) => {
                info!("interpreter not available, using local matcher");
                None
            }
            Err(e) => {
                warn!(error = %e, "interpreter request failed, using local matcher");
                None
            }
        };

        let Some(reply) = reply else {
            self.run_local(text).await;
            return;
        };

        if let Some(said) = reply.response {
            info!(response = %said, "interpreter replied");
            self.emit(AssistantEvent::AssistantSaid { text: said });
        }
        if let Some(audio) = reply.audio {
            self.speak(&audio).await;
        }
        if let Some(action) = reply.action {
            let parameters = reply.parameters.unwrap_or_else(|| json!({}));
            self.execute(&action, &parameters).await;
        }
    }

    async fn execute(&self, action: &str, parameters: &Value) {
        info!(action, "executing interpreter action");

        let success = match self.client.execute(action, parameters).await {
            Ok(reply) => {
                if !reply.success {
                    warn!(action, message = ?reply.message, "action rejected");
                }
                reply.success
            }
            Err(e) => {
                warn!(action, error = %e, "action request failed");
                false
            }
        };
        self.emit(AssistantEvent::CommandExecuted { action: action.to_string(), success });
    }

    async fn run_local(&self, text: &str) {
        let current = {
            let device = self.device.read().await;
            if device.reachable {
                device.status.brightness
            } else {
                debug!(assumed = self.fallback_brightness, "device state unknown, assuming brightness");
                self.fallback_brightness
            }
        };

        let Some(matched) = self.matcher.match_command(text, current) else {
            info!(%text, "no local command matched");
            self.emit(AssistantEvent::CommandUnknown { text: text.to_string() });
            return;
        };
        info!(action = %matched.label, "running local command");

        let success = match matched.action {
            LocalAction::StopAll => self.send(DeviceCommand::StopAll).await,
            LocalAction::Step(command) => self.send(command).await,
            LocalAction::Pulse { start, stop } => {
                let started = self.send(start).await;
                // Blind pulse, deliberately never cancelled
                let client = Arc::clone(&self.client);
                let pulse = self.pulse;
                tokio::spawn(async move {
                    tokio::time::sleep(pulse).await;
                    if let Err(e) = client.send(stop).await {
                        warn!(command = %stop, error = %e, "pulse stop failed");
                    }
                });
                started
            }
            LocalAction::SetBrightness(value) => {
                self.device.write().await.status.brightness = value;
                self.send(DeviceCommand::SetBrightness(value)).await
            }
        };

        self.emit(AssistantEvent::CommandExecuted { action: matched.label, success });
    }

    async fn send(&self, command: DeviceCommand) -> bool {
        match self.client.send(command).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%command, error = %e, "local command failed");
                false
            }
        }
    }

    /// Play speech with the recognizer paused so it does not hear itself
    async fn speak(&self, encoded: &str) {
        let audio = match decode_speech(encoded) {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "discarding undecodable speech");
                return;
            }
        };

        let _ = self.internal_tx.send(Internal::PlaybackStarted);
        self.emit(AssistantEvent::SpeakingStarted);

        if let Err(e) = self.player.play(audio).await {
            warn!(player = %self.player.name(), error = %e, "speech playback failed");
        }

        self.emit(AssistantEvent::SpeakingFinished);
        let _ = self.internal_tx.send(Internal::PlaybackFinished);
    }

    fn emit(&self, event: AssistantEvent) {
        let _ = self.event_tx.send(event);
    }
}
