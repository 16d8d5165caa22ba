//! Speech recognizer control
//!
//! The recognizer itself lives in the UI process; the daemon only asks it
//! to start or stop.

use tokio::sync::broadcast;
use tracing::debug;

use crate::events::{AssistantEvent, Subscribers};

#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("no client is listening for recognizer requests")]
    NoListener,
}

pub trait Recognizer: Send + Sync {
    fn start(&self) -> Result<(), RecognizerError>;

    fn stop(&self);
}

/// Publishes start/stop requests on the event bus for the IPC client
pub struct RemoteRecognizer {
    event_tx: broadcast::Sender<AssistantEvent>,
    /// Only subscribed IPC clients can run the recognizer
    subscribers: Subscribers,
}

impl RemoteRecognizer {
    pub fn new(event_tx: broadcast::Sender<AssistantEvent>, subscribers: Subscribers) -> Self {
        Self { event_tx, subscribers }
    }
}

impl Recognizer for RemoteRecognizer {
    fn start(&self) -> Result<(), RecognizerError> {
        if self.subscribers.count() == 0 {
            return Err(RecognizerError::NoListener);
        }
        debug!("requesting recognizer start");
        self.event_tx
            .send(AssistantEvent::RecognitionRequested { active: true })
            .map(|_| ())
            .map_err(|_| RecognizerError::NoListener)
    }

    fn stop(&self) {
        debug!("requesting recognizer stop");
        let _ = self
            .event_tx
            .send(AssistantEvent::RecognitionRequested { active: false });
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_recognizer_publishes_requests() {
        let (tx, mut rx) = broadcast::channel(4);
        let subscribers = Subscribers::default();
        let _client = subscribers.register();
        let recognizer = RemoteRecognizer::new(tx, subscribers);

        recognizer.start().unwrap();
        recognizer.stop();

        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::RecognitionRequested { active: true });
        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::RecognitionRequested { active: false });
    }

    #[test]
    fn test_remote_recognizer_needs_a_subscribed_client() {
        // A bus receiver alone (such as the IPC server's own) is not a client
        let (tx, mut rx) = broadcast::channel(4);
        let subscribers = Subscribers::default();
        let recognizer = RemoteRecognizer::new(tx, subscribers.clone());

        assert!(matches!(recognizer.start(), Err(RecognizerError::NoListener)));
        assert!(rx.try_recv().is_err());

        let client = subscribers.register();
        assert!(recognizer.start().is_ok());

        drop(client);
        assert!(matches!(recognizer.start(), Err(RecognizerError::NoListener)));
    }
}
