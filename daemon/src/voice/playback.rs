//! Synthesized speech playback
//!
//! The server returns speech as base64 audio. Decoding the container is
//! left to an external player process; the daemon only pipes bytes in and
//! waits for it to finish.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub type PlaybackFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("speech audio is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to run audio player: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("audio player exited with {0}")]
    Exit(std::process::ExitStatus),
}

/// Plays encoded speech audio to completion
pub trait AudioPlayer: Send + Sync {
    fn play(&self, audio: Vec<u8>) -> PlaybackFuture<'_>;

    fn name(&self) -> String;
}

/// Decode the base64 payload from an assistant reply
pub fn decode_speech(encoded: &str) -> Result<Vec<u8>, PlaybackError> {
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Pipes audio into an external program such as `mpv -` or `ffplay -i -`
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// `argv[0]` is the program; `None` when `argv` is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, audio: Vec<u8>) -> PlaybackFuture<'_> {
        Box::pin(async move {
            debug!(program = %self.program, bytes = audio.len(), "starting audio player");

            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&audio).await?;
                // Closing stdin signals end of stream
                drop(stdin);
            }

            let status = child.wait().await?;
            if status.success() {
                Ok(())
            } else {
                Err(PlaybackError::Exit(status))
            }
        })
    }

    fn name(&self) -> String {
        format!("command ({})", self.program)
    }
}

/// Used when no player is configured; returns immediately
pub struct NullPlayer;

impl AudioPlayer for NullPlayer {
    fn play(&self, audio: Vec<u8>) -> PlaybackFuture<'_> {
        Box::pin(async move {
            info!(bytes = audio.len(), "no audio player configured, skipping speech");
            Ok(())
        })
    }

    fn name(&self) -> String {
        "none".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_speech() {
        assert_eq!(decode_speech("aGVsbG8=\n").unwrap(), b"hello");
        assert!(matches!(decode_speech("not base64!"), Err(PlaybackError::Decode(_))));
    }

    #[test]
    fn test_command_player_from_argv() {
        assert!(CommandPlayer::from_argv(&[]).is_none());

        let player = CommandPlayer::from_argv(&["mpv".into(), "-".into()]).unwrap();
        assert_eq!(player.args, vec!["-".to_string()]);
        assert_eq!(player.name(), "command (mpv)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_player_waits_for_exit() {
        let ok = CommandPlayer::from_argv(&["cat".into()]).unwrap();
        tokio_test::assert_ok!(ok.play(b"speech".to_vec()).await);

        let failing = CommandPlayer::from_argv(&["false".into()]).unwrap();
        assert!(matches!(failing.play(Vec::new()).await, Err(PlaybackError::Exit(_))));
    }
}
