//! ptz-voice-daemon: PTZ camera gesture and voice command daemon
//!
//! This daemon sits between a camera control UI and the camera control
//! server and provides:
//! - Click-to-step / hold-to-move dispatch for PTZ buttons
//! - A wake-phrase gated voice command pipeline with a local fallback
//! - Device status polling
//! - IPC server for the UI (pointer input, transcripts, event push)
//!
//! Speech recognition and the UI itself live in the IPC client.

mod config;
mod control;
mod events;
mod ipc;
mod lifecycle;
mod ptz;
mod status;
mod voice;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::control::{ControlApi, HttpControlClient};
use crate::events::{AssistantEvent, Subscribers};
use crate::ipc::{Server, ServerHandles};
use crate::lifecycle::ShutdownSignal;
use crate::ptz::GestureDispatcher;
use crate::status::{shared_device, StatusPoller};
use crate::voice::{AudioPlayer, CommandPlayer, NullPlayer, RemoteRecognizer, VoicePipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ptz-voice-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket = %config.socket_path.display(),
        control = %config.control.base_url,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    let client: Arc<dyn ControlApi> = Arc::new(
        HttpControlClient::new(&config.control.base_url, config.control.timeout())
            .context("failed to build control client")?,
    );
    let device = shared_device();

    // Gesture dispatcher and voice pipeline -> IPC subscribers
    let (event_tx, _) = broadcast::channel::<AssistantEvent>(128);
    // IPC server -> gesture dispatcher
    let (gesture_tx, gesture_rx) = mpsc::channel(32);
    // IPC server -> voice pipeline
    let (voice_tx, voice_rx) = mpsc::channel(32);
    // Subscribed IPC clients, one of which runs the speech recognizer
    let subscribers = Subscribers::default();

    let mut dispatcher = GestureDispatcher::new(
        config.ptz.bindings.clone(),
        config.ptz.settle_delay(),
        Arc::clone(&client),
        event_tx.clone(),
    );

    let player: Arc<dyn AudioPlayer> = match CommandPlayer::from_argv(&config.voice.player) {
        Some(player) => Arc::new(player),
        None => Arc::new(NullPlayer),
    };
    info!(player = %player.name(), "speech playback configured");

    let mut pipeline = VoicePipeline::new(
        &config.voice,
        Arc::clone(&client),
        player,
        Arc::new(RemoteRecognizer::new(event_tx.clone(), subscribers.clone())),
        device.clone(),
        event_tx.clone(),
    );

    let poller = StatusPoller::new(
        Arc::clone(&client),
        device.clone(),
        config.control.status_interval(),
    );

    let server = Server::new(
        &config.socket_path,
        ServerHandles { gesture_tx, voice_tx, client, device, event_tx, subscribers },
    )?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = dispatcher.run(gesture_rx) => {
            info!("gesture dispatcher exited");
        }
        _ = pipeline.run(voice_rx) => {
            info!("voice pipeline exited");
        }
        _ = poller.run() => {
            info!("status poller exited");
        }
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "IPC server error");
            }
        }
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    // Leave the camera still
    dispatcher.stop_all().await;
    server.shutdown().await;

    info!("ptz-voice-daemon stopped");

    Ok(())
}
