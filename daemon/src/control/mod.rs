//! Control server module
//!
//! The camera control server is a black box reached over HTTP. Everything
//! the daemon needs from it sits behind the `ControlApi` trait so the
//! gesture dispatcher and voice pipeline can be driven by a recording
//! double in tests.

mod command;
mod http;
mod types;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub use command::{Axis, DeviceCommand, Direction};
pub use http::HttpControlClient;
pub use types::{AssistantReply, DeviceStatus, ExecuteReply, Histogram, Language};

/// Boxed future returned by every `ControlApi` call
pub type ControlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ControlError>> + Send + 'a>>;

/// Errors from talking to the control server
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    /// HTTP 200 whose body reports failure, e.g. `{"error": "Camera not available"}`
    #[error("{path} rejected the command: {message}")]
    Rejected { path: String, message: String },

    #[error("{path} is not available on this server")]
    Unsupported { path: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Capability surface of the control server
pub trait ControlApi: Send + Sync {
    /// Issue a movement or adjustment command
    fn send(&self, command: DeviceCommand) -> ControlFuture<'_, Value>;

    fn status(&self) -> ControlFuture<'_, DeviceStatus>;

    fn histogram(&self) -> ControlFuture<'_, Histogram>;

    /// Ask the server to describe the current camera frame
    fn describe_scene(&self, language: Language) -> ControlFuture<'_, AssistantReply>;

    /// Submit free text to the remote command interpreter
    fn interpret<'a>(&'a self, text: &'a str) -> ControlFuture<'a, AssistantReply>;

    /// Run a structured action produced by the interpreter
    fn execute<'a>(&'a self, action: &'a str, parameters: &'a Value)
        -> ControlFuture<'a, ExecuteReply>;
}

#[cfg(test)]
pub mod testing {
    //! Recording `ControlApi` double

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;

    /// Scripted outcome for `interpret`
    pub enum InterpretOutcome {
        Reply(AssistantReply),
        Unsupported,
        TransportDown,
    }

    pub struct RecordingControl {
        started: Instant,
        sent: Mutex<Vec<(Duration, DeviceCommand)>>,
        interpreted: Mutex<Vec<String>>,
        visions: Mutex<Vec<Language>>,
        executed: Mutex<Vec<(String, Value)>>,
        interpret_outcomes: Mutex<VecDeque<InterpretOutcome>>,
        interpret_delay: Mutex<Duration>,
        vision_reply: Mutex<AssistantReply>,
        fail_sends: Mutex<bool>,
    }

    impl RecordingControl {
        pub fn new() -> Self {
            Self {
                started: Instant::now(),
                sent: Mutex::new(Vec::new()),
                interpreted: Mutex::new(Vec::new()),
                visions: Mutex::new(Vec::new()),
                executed: Mutex::new(Vec::new()),
                interpret_outcomes: Mutex::new(VecDeque::new()),
                interpret_delay: Mutex::new(Duration::ZERO),
                vision_reply: Mutex::new(AssistantReply {
                    response: Some("a desk".into()),
                    ..Default::default()
                }),
                fail_sends: Mutex::new(false),
            }
        }

        pub fn push_interpret(&self, outcome: InterpretOutcome) {
            self.interpret_outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn set_interpret_delay(&self, delay: Duration) {
            *self.interpret_delay.lock().unwrap() = delay;
        }

        pub fn set_vision_reply(&self, reply: AssistantReply) {
            *self.vision_reply.lock().unwrap() = reply;
        }

        pub fn fail_sends(&self) {
            *self.fail_sends.lock().unwrap() = true;
        }

        pub fn sent(&self) -> Vec<DeviceCommand> {
            self.sent.lock().unwrap().iter().map(|(_, c)| *c).collect()
        }

        /// Commands with the time they were sent, relative to construction
        pub fn sent_at(&self) -> Vec<(Duration, DeviceCommand)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn interpreted(&self) -> Vec<String> {
            self.interpreted.lock().unwrap().clone()
        }

        pub fn visions(&self) -> Vec<Language> {
            self.visions.lock().unwrap().clone()
        }

        pub fn executed(&self) -> Vec<(String, Value)> {
            self.executed.lock().unwrap().clone()
        }
    }

    impl ControlApi for RecordingControl {
        fn send(&self, command: DeviceCommand) -> ControlFuture<'_, Value> {
            Box::pin(async move {
                self.sent
                    .lock()
                    .unwrap()
                    .push((self.started.elapsed(), command));
                if *self.fail_sends.lock().unwrap() {
                    return Err(ControlError::Status { path: command.path(), status: 500 });
                }
                Ok(json!({ "ok": true }))
            })
        }

        fn status(&self) -> ControlFuture<'_, DeviceStatus> {
            Box::pin(async move {
                Ok(DeviceStatus { connected: true, brightness: 30, ..Default::default() })
            })
        }

        fn histogram(&self) -> ControlFuture<'_, Histogram> {
            Box::pin(async move { Ok(Histogram::default()) })
        }

        fn describe_scene(&self, language: Language) -> ControlFuture<'_, AssistantReply> {
            Box::pin(async move {
                self.visions.lock().unwrap().push(language);
                Ok(self.vision_reply.lock().unwrap().clone())
            })
        }

        fn interpret<'a>(&'a self, text: &'a str) -> ControlFuture<'a, AssistantReply> {
            Box::pin(async move {
                self.interpreted.lock().unwrap().push(text.to_string());
                let delay = *self.interpret_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let outcome = self.interpret_outcomes.lock().unwrap().pop_front();
                match outcome {
                    Some(InterpretOutcome::Reply(reply)) => Ok(reply),
                    Some(InterpretOutcome::TransportDown) => {
                        Err(ControlError::Decode("connection refused".into()))
                    }
                    Some(InterpretOutcome::Unsupported) | None => Err(ControlError::Unsupported {
                        path: "/robot/text_command".into(),
                    }),
                }
            })
        }

        fn execute<'a>(
            &'a self,
            action: &'a str,
            parameters: &'a Value,
        ) -> ControlFuture<'a, ExecuteReply> {
            Box::pin(async move {
                self.executed
                    .lock()
                    .unwrap()
                    .push((action.to_string(), parameters.clone()));
                Ok(ExecuteReply { success: true, message: None })
            })
        }
    }
}
