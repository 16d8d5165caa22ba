//! Click-versus-hold gesture dispatcher
//!
//! Turns press/release/cancel sequences on PTZ buttons into either a
//! single step command or a start/stop pair around a continuous movement.
//! At most one binding is in continuous movement at any instant: every
//! press first issues a global stop before its hold timer is armed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::control::{ControlApi, DeviceCommand};
use crate::events::AssistantEvent;

use super::binding::{Binding, PressSession};

/// Delay between a click's release and its step command
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 50;

/// Pointer input from the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureInput {
    PressStart(String),
    PressEnd(String),
    /// Pointer or touch left the button before release
    PressCancel(String),
    StopAll,
}

/// Posted by a hold-threshold timer when it fires
#[derive(Debug)]
struct HoldElapsed {
    binding: String,
    generation: u64,
}

enum Next {
    Input(GestureInput),
    HoldElapsed(HoldElapsed),
}

pub struct GestureDispatcher {
    bindings: HashMap<String, Binding>,
    sessions: HashMap<String, PressSession>,
    /// Binding currently in continuous movement
    active: Option<String>,
    next_generation: u64,
    settle_delay: Duration,
    client: Arc<dyn ControlApi>,
    event_tx: broadcast::Sender<AssistantEvent>,
    timer_tx: mpsc::UnboundedSender<HoldElapsed>,
    timer_rx: mpsc::UnboundedReceiver<HoldElapsed>,
}

impl GestureDispatcher {
    pub fn new(
        bindings: Vec<Binding>,
        settle_delay: Duration,
        client: Arc<dyn ControlApi>,
        event_tx: broadcast::Sender<AssistantEvent>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            bindings: bindings.into_iter().map(|b| (b.id.clone(), b)).collect(),
            sessions: HashMap::new(),
            active: None,
            next_generation: 0,
            settle_delay,
            client,
            event_tx,
            timer_tx,
            timer_rx,
        }
    }

    /// Binding currently in continuous movement, if any
    pub fn active_binding(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Process UI input and hold timers until the input channel closes
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<GestureInput>) {
        info!(bindings = self.bindings.len(), "gesture dispatcher started");

        loop {
            let next = tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => Next::Input(input),
                    None => break,
                },
                Some(elapsed) = self.timer_rx.recv() => Next::HoldElapsed(elapsed),
            };

            match next {
                Next::Input(GestureInput::PressStart(id)) => self.on_press_start(&id).await,
                Next::Input(GestureInput::PressEnd(id)) => self.on_press_end(&id).await,
                Next::Input(GestureInput::PressCancel(id)) => self.on_press_cancel(&id).await,
                Next::Input(GestureInput::StopAll) => {
                    self.emit(AssistantEvent::StoppedAll);
                    self.stop_all().await;
                }
                Next::HoldElapsed(elapsed) => self.on_hold_elapsed(elapsed).await,
            }
        }

        for session in self.sessions.values_mut() {
            session.disarm();
        }
        info!("gesture dispatcher stopped");
    }

    /// Begin a press: stop everything, then arm the hold timer
    pub async fn on_press_start(&mut self, id: &str) {
        let Some(binding) = self.bindings.get(id) else {
            warn!(binding = id, "press on unknown binding ignored");
            return;
        };
        let threshold = Duration::from_millis(binding.hold_threshold_ms);

        if self.sessions.get(id).is_some_and(|s| s.pressed) {
            debug!(binding = id, "already pressed");
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.sessions.insert(id.to_string(), PressSession::pressed(generation));

        // Must complete before the timer exists: a stop from an earlier hold
        // may still be in flight.
        self.stop_all().await;

        let timer_tx = self.timer_tx.clone();
        let binding = id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            let _ = timer_tx.send(HoldElapsed { binding, generation });
        });

        match self.sessions.get_mut(id) {
            Some(session) if session.generation == generation => session.pending = Some(timer),
            _ => timer.abort(),
        }
        debug!(binding = id, threshold_ms = threshold.as_millis() as u64, "press started");
    }

    /// Hold threshold reached while still pressed: start continuous movement
    async fn on_hold_elapsed(&mut self, elapsed: HoldElapsed) {
        let Some(session) = self.sessions.get_mut(&elapsed.binding) else {
            debug!(binding = %elapsed.binding, "hold timer fired after release");
            return;
        };
        if !session.pressed || session.holding || session.generation != elapsed.generation {
            debug!(binding = %elapsed.binding, "stale hold timer ignored");
            return;
        }

        session.pending = None;
        session.holding = true;
        session.hold_started_at = Some(Instant::now());

        let Some(start) = self.bindings.get(&elapsed.binding).map(|b| b.start) else {
            return;
        };
        self.active = Some(elapsed.binding.clone());

        info!(binding = %elapsed.binding, "hold started");
        self.emit(AssistantEvent::HoldStarted { binding: elapsed.binding.clone() });
        self.issue(&elapsed.binding, start).await;
    }

    /// Release: stop a hold, or schedule a step for a click
    pub async fn on_press_end(&mut self, id: &str) {
        let Some(mut session) = self.sessions.remove(id) else {
            debug!(binding = id, "release without press");
            return;
        };
        if !session.pressed {
            return;
        }
        session.disarm();

        let Some(binding) = self.bindings.get(id) else {
            return;
        };
        let (stop, step) = (binding.stop, binding.step);

        if session.holding {
            let duration_ms = session
                .hold_started_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0);
            info!(binding = id, duration_ms, "hold released");
            self.emit(AssistantEvent::HoldStopped { binding: id.to_string(), duration_ms });
            self.end_hold(id, stop).await;
        } else if let Some(step) = step {
            debug!(binding = id, "click, stepping");
            self.emit(AssistantEvent::Stepped { binding: id.to_string() });

            let client = Arc::clone(&self.client);
            let settle = self.settle_delay;
            let binding = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(settle).await;
                match client.send(step).await {
                    Ok(reply) => debug!(binding = %binding, %step, ?reply, "step sent"),
                    Err(e) => warn!(binding = %binding, %step, error = %e, "step command failed"),
                }
            });
        }
    }

    /// Pointer left mid-press: stop any hold, never step
    pub async fn on_press_cancel(&mut self, id: &str) {
        let Some(mut session) = self.sessions.remove(id) else {
            return;
        };
        session.disarm();
        self.emit(AssistantEvent::PressCancelled { binding: id.to_string() });

        if session.holding {
            info!(binding = id, "hold cancelled");
            let stop = self.bindings.get(id).and_then(|b| b.stop);
            self.end_hold(id, stop).await;
        }
    }

    /// Halt every axis and forget the active binding
    pub async fn stop_all(&mut self) {
        self.active = None;
        match self.client.send(DeviceCommand::StopAll).await {
            Ok(_) => debug!("all movement stopped"),
            Err(e) => warn!(error = %e, "stop-all command failed"),
        }
    }

    /// Clear ownership first so a quick follow-up press is never blocked
    async fn end_hold(&mut self, id: &str, stop: Option<DeviceCommand>) {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        match stop {
            Some(stop) => self.issue(id, stop).await,
            None => self.stop_all().await,
        }
    }

    async fn issue(&self, binding: &str, command: DeviceCommand) {
        match self.client.send(command).await {
            Ok(reply) => debug!(binding, %command, ?reply, "command sent"),
            Err(e) => warn!(binding, %command, error = %e, "command failed"),
        }
    }

    fn emit(&self, event: AssistantEvent) {
        let _ = self.event_tx.send(event);
    }
}
