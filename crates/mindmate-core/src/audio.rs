//! Microphone capture and playback of synthesized speech.
//!
//! Both are driven through external programs (a recorder that streams webm to
//! stdout, a player that takes a file path), so any host with ffmpeg works and
//! tests can swap in fakes through the traits.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{CaptureError, PlaybackError};

const CHUNK_SIZE: usize = 4096;

/// An assembled recording, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub mime_type: &'static str,
}

impl AudioClip {
    /// Concatenate captured chunks in order. Zero chunks give an empty clip.
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            bytes: chunks.concat(),
            file_name: "audio.webm",
            mime_type: "audio/webm",
        }
    }
}

/// Grants exclusive capture sessions on an input device.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// An open microphone. `finish` stops capture, releases the device and
/// returns every chunk captured, in order.
#[async_trait]
pub trait CaptureSession: Send {
    async fn finish(&mut self) -> Vec<Vec<u8>>;
}

/// Plays audio and resolves once playback has ended.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError>;
}

pub fn default_recorder_command() -> Vec<String> {
    [
        "ffmpeg", "-hide_banner", "-loglevel", "error", "-f", "pulse", "-i", "default",
        "-c:a", "libopus", "-f", "webm", "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Map recorder stderr to one of the distinguished failure categories
pub fn classify_capture_failure(stderr: &str) -> CaptureError {
    let lower = stderr.to_lowercase();

    if ["permission denied", "not permitted", "access denied"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return CaptureError::PermissionDenied;
    }

    if ["no such device", "no such file or directory", "device not found", "no such audio device", "cannot open audio device", "no capture device"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return CaptureError::NoDevice;
    }

    let detail = stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("recorder exited unexpectedly");
    CaptureError::Other(detail.to_string())
}

fn split_command(command: &[String]) -> Option<(&String, &[String])> {
    command.split_first()
}

/// Records by running an external program that writes audio to stdout.
pub struct CommandMicrophone {
    command: Vec<String>,
    /// How long a freshly spawned recorder gets to fail on a bad device
    settle: Duration,
}

impl CommandMicrophone {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            settle: Duration::from_millis(300),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

#[async_trait]
impl Microphone for CommandMicrophone {
    async fn open(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| CaptureError::Other("recorder command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
                ErrorKind::NotFound => CaptureError::Other(format!("recorder `{program}` not found")),
                _ => CaptureError::Other(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Other("recorder stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        tokio::time::sleep(self.settle).await;

        if let Some(status) = child
            .try_wait()
            .map_err(|e| CaptureError::Other(e.to_string()))?
        {
            let mut message = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut message).await;
            }
            tracing::warn!(%status, stderr = %message.trim(), "recorder exited at startup");
            return Err(classify_capture_failure(&message));
        }

        if let Some(mut stderr) = stderr {
            tokio::spawn(async move {
                let mut message = String::new();
                if stderr.read_to_string(&mut message).await.is_ok() && !message.trim().is_empty() {
                    tracing::debug!(stderr = %message.trim(), "recorder output");
                }
            });
        }

        tracing::info!(%program, "microphone open");
        Ok(Box::new(CommandCapture {
            child,
            reader: Some(tokio::spawn(read_chunks(stdout))),
        }))
    }
}

async fn read_chunks(mut stdout: ChildStdout) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => chunks.push(buf[..n].to_vec()),
            Err(e) => {
                tracing::warn!(error = %e, "recorder stream failed");
                break;
            }
        }
    }
    chunks
}

struct CommandCapture {
    child: Child,
    reader: Option<JoinHandle<Vec<Vec<u8>>>>,
}

#[async_trait]
impl CaptureSession for CommandCapture {
    async fn finish(&mut self) -> Vec<Vec<u8>> {
        // ffmpeg finalizes the container on `q`; anything else gets killed
        if let Some(mut stdin) = self.child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
        }

        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "recorder stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "waiting for recorder failed"),
            Err(_) => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                tracing::debug!("recorder killed");
            }
        }

        let chunks = match self.reader.take() {
            Some(reader) => reader.await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "recorder reader task failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        tracing::info!(chunks = chunks.len(), "microphone released");
        chunks
    }
}

/// Plays audio by writing it to a temporary file and running a player on it.
pub struct CommandPlayer {
    command: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| PlaybackError::Player("player command is empty".to_string()))?;

        let path = tempfile::Builder::new()
            .prefix("mindmate-")
            .suffix(".mp3")
            .tempfile()?
            .into_temp_path();
        tokio::fs::write(&path, &audio).await?;

        let status = Command::new(program)
            .args(args)
            .arg(path.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PlaybackError::Player(format!("player `{program}` not found")),
                _ => PlaybackError::Io(e),
            })?;

        if !status.success() {
            return Err(PlaybackError::Player(format!("`{program}` exited with {status}")));
        }

        // Playback ended: release the file
        path.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_from_chunks_keeps_order() {
        let clip = AudioClip::from_chunks(vec![vec![1, 2], vec![3], vec![4, 5]]);
        assert_eq!(clip.bytes, vec![1, 2, 3, 4, 5]);
        assert_eq!(clip.file_name, "audio.webm");
        assert_eq!(clip.mime_type, "audio/webm");
    }

    #[test]
    fn test_clip_from_no_chunks_is_empty() {
        let clip = AudioClip::from_chunks(Vec::new());
        assert!(clip.bytes.is_empty());
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = classify_capture_failure("[pulse @ 0x55] pa_context_connect() failed: Access denied\n");
        assert_eq!(err, CaptureError::PermissionDenied);
        assert_eq!(
            classify_capture_failure("/dev/snd/pcmC0D0c: Permission denied"),
            CaptureError::PermissionDenied
        );
    }

    #[test]
    fn test_classify_no_device() {
        assert_eq!(
            classify_capture_failure("default: No such file or directory"),
            CaptureError::NoDevice
        );
        assert_eq!(
            classify_capture_failure("arecord: main:830: audio open error: No such device"),
            CaptureError::NoDevice
        );
    }

    #[test]
    fn test_classify_other_uses_first_line() {
        assert_eq!(
            classify_capture_failure("\n  Unknown input format: 'pulse'\nmore\n"),
            CaptureError::Other("Unknown input format: 'pulse'".to_string())
        );
        assert_eq!(
            classify_capture_failure(""),
            CaptureError::Other("recorder exited unexpectedly".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_recorder_is_other() {
        let mic = CommandMicrophone::new(vec!["mindmate-no-such-recorder".to_string()]);
        match mic.open().await {
            Err(CaptureError::Other(msg)) => assert!(msg.contains("not found")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("recorder should not start"),
        }
    }

    #[tokio::test]
    async fn test_empty_commands_are_rejected() {
        assert!(matches!(
            CommandMicrophone::new(Vec::new()).open().await,
            Err(CaptureError::Other(_))
        ));
        assert!(matches!(
            CommandPlayer::new(Vec::new()).play(vec![1, 2, 3]).await,
            Err(PlaybackError::Player(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorder_stdout_is_captured() {
        let mic = CommandMicrophone::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf webm-bytes; read line".to_string(),
        ])
        .with_settle(Duration::from_millis(50));

        let mut session = mic.open().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let chunks = session.finish().await;
        assert_eq!(AudioClip::from_chunks(chunks).bytes, b"webm-bytes".to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorder_failing_at_startup_is_classified() {
        let mic = CommandMicrophone::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'cannot open audio device default' >&2; exit 1".to_string(),
        ])
        .with_settle(Duration::from_millis(200));

        assert_eq!(mic.open().await.err(), Some(CaptureError::NoDevice));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_failure_is_reported() {
        let player = CommandPlayer::new(vec!["false".to_string()]);
        assert!(matches!(player.play(vec![0; 8]).await, Err(PlaybackError::Player(_))));

        let player = CommandPlayer::new(vec!["true".to_string()]);
        assert!(player.play(vec![0; 8]).await.is_ok());
    }
}
