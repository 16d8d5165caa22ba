//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! assistant events to subscribed clients. Pointer and recognizer input is
//! forwarded to the gesture dispatcher and voice pipeline channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::control::{ControlApi, DeviceCommand};
use crate::events::{AssistantEvent, SubscriberGuard, Subscribers};
use crate::ptz::GestureInput;
use crate::status::SharedDevice;
use crate::voice::{VoiceInput, VoiceState};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Frames above this size drop the client
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Components the server routes requests to
pub struct ServerHandles {
    pub gesture_tx: mpsc::Sender<GestureInput>,
    pub voice_tx: mpsc::Sender<VoiceInput>,
    pub client: Arc<dyn ControlApi>,
    pub device: SharedDevice,
    pub event_tx: broadcast::Sender<AssistantEvent>,
    /// Shared with the recognizer, which needs a subscribed client
    pub subscribers: Subscribers,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Arc<ServerHandles>,
}

/// Shared server state
struct ServerState {
    start_time: std::time::Instant,
    /// Mirrored from `VoiceStateChanged` events
    voice_state: VoiceState,
}

/// What the per-client reader task hands to the client loop
enum Incoming {
    Request(Request),
    Malformed(String),
}

enum ClientNext {
    Incoming(Incoming),
    Event(Option<AssistantEvent>),
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, handles: ServerHandles) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            start_time: std::time::Instant::now(),
            voice_state: VoiceState::Off,
        }));

        info!(socket = %socket_path.display(), "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            handles: Arc::new(handles),
        })
    }

    /// Run the server, accepting connections and tracking voice state
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;
        let mut event_rx = self.handles.event_tx.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.spawn_client(stream),
                    Err(e) => error!(error = %e, "accept error"),
                },
                event = event_rx.recv() => match event {
                    Ok(event) => self.apply_event(&event).await,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "IPC event receiver lagged"),
                    Err(RecvError::Closed) => {
                        info!("event bus closed, IPC server exiting");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn spawn_client(&self, stream: UnixStream) {
        debug!("client connected");
        let state = Arc::clone(&self.state);
        let handles = Arc::clone(&self.handles);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                result = Self::handle_client(stream, state, handles) => {
                    if let Err(e) = result {
                        warn!(error = %e, "client handler error");
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("client handler shutting down");
                }
            }
        });
    }

    async fn apply_event(&self, event: &AssistantEvent) {
        if let AssistantEvent::VoiceStateChanged { from, to } = event {
            self.state.write().await.voice_state = *to;
            debug!(%from, %to, "IPC server: voice state updated");
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        handles: Arc<ServerHandles>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (incoming_tx, incoming_rx) = mpsc::channel(16);

        // Frame reads are not cancel-safe, so they get their own task
        let reader_task = tokio::spawn(async move {
            loop {
                let incoming = match read_frame(&mut reader).await {
                    Ok(Some(body)) => match serde_json::from_slice::<Request>(&body) {
                        Ok(request) => Incoming::Request(request),
                        Err(e) => Incoming::Malformed(e.to_string()),
                    },
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping client");
                        break;
                    }
                };
                if incoming_tx.send(incoming).await.is_err() {
                    break;
                }
            }
        });

        let result = Self::serve(&mut writer, incoming_rx, &state, &handles).await;
        reader_task.abort();
        result
    }

    async fn serve(
        writer: &mut OwnedWriteHalf,
        mut incoming_rx: mpsc::Receiver<Incoming>,
        state: &RwLock<ServerState>,
        handles: &ServerHandles,
    ) -> Result<()> {
        let mut events: Option<broadcast::Receiver<AssistantEvent>> = None;
        let mut _registration: Option<SubscriberGuard> = None;

        loop {
            let next = tokio::select! {
                incoming = incoming_rx.recv() => match incoming {
                    Some(incoming) => ClientNext::Incoming(incoming),
                    None => return Ok(()),
                },
                event = next_event(&mut events) => ClientNext::Event(event),
            };

            match next {
                ClientNext::Incoming(Incoming::Request(request)) => {
                    debug!(?request, "received request");
                    let (response, subscribe) = Self::process_request(request, state, handles).await;
                    if subscribe && events.is_none() {
                        events = Some(handles.event_tx.subscribe());
                        _registration = Some(handles.subscribers.register());
                        debug!("client subscribed to notifications");
                    }
                    send_message(writer, &response).await?;
                }
                ClientNext::Incoming(Incoming::Malformed(reason)) => {
                    warn!(%reason, "malformed request");
                    send_message(writer, &Response::error("bad_request", reason)).await?;
                }
                ClientNext::Event(Some(event)) => {
                    send_message(writer, &Notification::Event { event }).await?;
                }
                ClientNext::Event(None) => {
                    events = None;
                    _registration = None;
                }
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &RwLock<ServerState>,
        handles: &ServerHandles,
    ) -> (Response, bool) {
        let response = match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let state = state.read().await;
                Response::Status(DaemonStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    voice_state: state.voice_state,
                    device: handles.device.read().await.clone(),
                    uptime_secs: state.start_time.elapsed().as_secs(),
                })
            }

            Request::Subscribe => return (Response::Subscribed, true),

            Request::Press { binding } => {
                forward(&handles.gesture_tx, GestureInput::PressStart(binding), "gestures").await
            }
            Request::Release { binding } => {
                forward(&handles.gesture_tx, GestureInput::PressEnd(binding), "gestures").await
            }
            Request::Cancel { binding } => {
                forward(&handles.gesture_tx, GestureInput::PressCancel(binding), "gestures").await
            }
            Request::StopAll => forward(&handles.gesture_tx, GestureInput::StopAll, "gestures").await,

            Request::SetVoiceEnabled { enabled } => {
                forward(&handles.voice_tx, VoiceInput::SetEnabled(enabled), "voice").await
            }
            Request::Transcript { text } => {
                forward(&handles.voice_tx, VoiceInput::Transcript(text), "voice").await
            }
            Request::RecognitionEnded => {
                forward(&handles.voice_tx, VoiceInput::RecognitionEnded, "voice").await
            }
            Request::RecognitionError { error } => {
                forward(&handles.voice_tx, VoiceInput::RecognitionError(error), "voice").await
            }

            Request::SendCommand { command } => match handles.client.send(command).await {
                Ok(_) => {
                    if let DeviceCommand::SetBrightness(value) = command {
                        handles.device.write().await.status.brightness = value;
                    }
                    Response::CommandResult { ok: true, message: None }
                }
                Err(e) => {
                    warn!(%command, error = %e, "command from IPC client failed");
                    Response::CommandResult { ok: false, message: Some(e.to_string()) }
                }
            },

            Request::GetHistogram => match handles.client.histogram().await {
                Ok(histogram) => Response::Histogram(histogram),
                Err(e) => Response::error("control_error", e.to_string()),
            },
        };

        (response, false)
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

async fn forward<T>(tx: &mpsc::Sender<T>, input: T, handler: &str) -> Response {
    match tx.send(input).await {
        Ok(()) => Response::Accepted,
        Err(_) => {
            warn!(handler, "input channel closed");
            Response::error("unavailable", format!("{} handler is not running", handler))
        }
    }
}

/// Next event for a subscribed client; pends forever when unsubscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<AssistantEvent>>,
) -> Option<AssistantEvent> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "subscriber lagged"),
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Read one length-prefixed frame; `None` on clean EOF
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large ({} bytes)", len);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::RecordingControl;
    use crate::control::{Axis, Direction};
    use crate::status::shared_device;
    use serde_json::{json, Value};

    struct Fixture {
        server: Arc<Server>,
        control: Arc<RecordingControl>,
        gesture_rx: mpsc::Receiver<GestureInput>,
        voice_rx: mpsc::Receiver<VoiceInput>,
        event_tx: broadcast::Sender<AssistantEvent>,
        subscribers: Subscribers,
        socket_path: PathBuf,
    }

    fn fixture(name: &str) -> Fixture {
        let socket_path = std::env::temp_dir()
            .join(format!("ptz-voice-{}-{}", std::process::id(), name))
            .join("daemon.sock");
        let control = Arc::new(RecordingControl::new());
        let (gesture_tx, gesture_rx) = mpsc::channel(8);
        let (voice_tx, voice_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(16);
        let subscribers = Subscribers::default();

        let handles = ServerHandles {
            gesture_tx,
            voice_tx,
            client: control.clone(),
            device: shared_device(),
            event_tx: event_tx.clone(),
            subscribers: subscribers.clone(),
        };
        let server = Arc::new(Server::new(&socket_path, handles).unwrap());
        Fixture { server, control, gesture_rx, voice_rx, event_tx, subscribers, socket_path }
    }

    async fn connect(f: &Fixture) -> UnixStream {
        let server = Arc::clone(&f.server);
        tokio::spawn(async move { server.run().await });
        UnixStream::connect(&f.socket_path).await.unwrap()
    }

    async fn roundtrip(stream: &mut UnixStream, request: Value) -> Value {
        send_message(stream, &request).await.unwrap();
        let body = read_frame(stream).await.unwrap().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture("perms");
        let mode = std::fs::metadata(&f.socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        f.server.shutdown().await;
        assert!(!f.socket_path.exists());
    }

    #[tokio::test]
    async fn test_ping() {
        let f = fixture("ping");
        let mut stream = connect(&f).await;

        let reply = roundtrip(&mut stream, json!({"type": "ping"})).await;
        assert_eq!(reply, json!({"type": "pong"}));
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_pointer_input_is_forwarded() {
        let mut f = fixture("press");
        let mut stream = connect(&f).await;

        let reply = roundtrip(&mut stream, json!({"type": "press", "binding": "zoomIn"})).await;
        assert_eq!(reply["type"], "accepted");
        roundtrip(&mut stream, json!({"type": "cancel", "binding": "zoomIn"})).await;

        assert_eq!(f.gesture_rx.recv().await, Some(GestureInput::PressStart("zoomIn".into())));
        assert_eq!(f.gesture_rx.recv().await, Some(GestureInput::PressCancel("zoomIn".into())));
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_recognizer_input_is_forwarded() {
        let mut f = fixture("voice");
        let mut stream = connect(&f).await;

        roundtrip(&mut stream, json!({"type": "transcript", "text": "Hey Stacy"})).await;
        roundtrip(&mut stream, json!({"type": "recognition_error", "error": "no-speech"})).await;

        assert_eq!(f.voice_rx.recv().await, Some(VoiceInput::Transcript("Hey Stacy".into())));
        assert_eq!(
            f.voice_rx.recv().await,
            Some(VoiceInput::RecognitionError("no-speech".into()))
        );
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_command_goes_to_control_server() {
        let f = fixture("command");
        let mut stream = connect(&f).await;

        let reply =
            roundtrip(&mut stream, json!({"type": "send_command", "command": "/brightness/42"}))
                .await;
        assert_eq!(reply, json!({"type": "command_result", "ok": true, "message": null}));
        assert_eq!(f.control.sent(), vec![DeviceCommand::SetBrightness(42)]);

        let status = roundtrip(&mut stream, json!({"type": "get_status"})).await;
        assert_eq!(status["device"]["status"]["brightness"], 42);
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_command_is_reported() {
        let f = fixture("command-fail");
        f.control.fail_sends();
        let mut stream = connect(&f).await;

        let reply =
            roundtrip(&mut stream, json!({"type": "send_command", "command": "/ptz/stop"})).await;
        assert_eq!(reply["ok"], false);
        assert!(reply["message"].as_str().unwrap().contains("500"));
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection() {
        let f = fixture("malformed");
        let mut stream = connect(&f).await;

        let reply = roundtrip(&mut stream, json!({"type": "launch_rockets"})).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "bad_request");

        let reply = roundtrip(&mut stream, json!({"type": "ping"})).await;
        assert_eq!(reply["type"], "pong");
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let f = fixture("subscribe");
        let mut stream = connect(&f).await;

        assert_eq!(f.subscribers.count(), 0);
        let reply = roundtrip(&mut stream, json!({"type": "subscribe"})).await;
        assert_eq!(reply["type"], "subscribed");
        assert_eq!(f.subscribers.count(), 1);

        f.event_tx
            .send(AssistantEvent::HoldStarted { binding: "ptzLeft".into() })
            .unwrap();

        let body = read_frame(&mut stream).await.unwrap().unwrap();
        let note: Notification = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            note,
            Notification::Event { event: AssistantEvent::HoldStarted { binding: "ptzLeft".into() } }
        );
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_releases_subscription() {
        let f = fixture("unsubscribe");
        let mut stream = connect(&f).await;

        roundtrip(&mut stream, json!({"type": "subscribe"})).await;
        assert_eq!(f.subscribers.count(), 1);

        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while f.subscribers.count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_voice_state_is_mirrored() {
        let f = fixture("mirror");
        f.server
            .apply_event(&AssistantEvent::VoiceStateChanged {
                from: VoiceState::Armed,
                to: VoiceState::Listening,
            })
            .await;

        let (response, subscribe) =
            Server::process_request(Request::GetStatus, &f.server.state, &f.server.handles).await;
        assert!(!subscribe);
        match response {
            Response::Status(status) => {
                assert_eq!(status.voice_state, VoiceState::Listening);
                assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_pipeline_reports_unavailable() {
        let f = fixture("closed");
        drop(f.voice_rx);

        let (response, _) = Server::process_request(
            Request::SetVoiceEnabled { enabled: true },
            &f.server.state,
            &f.server.handles,
        )
        .await;
        assert!(matches!(response, Response::Error { ref code, .. } if code == "unavailable"));
        f.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes());
        let mut reader = frame.as_slice();
        assert!(read_frame(&mut reader).await.is_err());

        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).await.unwrap().is_none());
    }

    #[test]
    fn test_step_command_wire_value() {
        let req = Request::SendCommand {
            command: DeviceCommand::Step { axis: Axis::Pan, direction: Direction::Right },
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"type": "send_command", "command": "/ptz/right"})
        );
    }
}
