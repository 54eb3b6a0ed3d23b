//! Conversation flow: everything a user action does between the view and the backend.
//!
//! `ChatClient` is cheap to clone. Front ends spawn each action on its own clone,
//! so a slow reply never blocks typing, and replies may arrive in any order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::api::{Backend, Transcription};
use crate::audio::{AudioClip, AudioPlayer, CaptureSession, Microphone};
use crate::error::{ApiError, CaptureError};
use crate::mode::ChatMode;
use crate::state::{HistoryEntry, Message, Sender};
use crate::view::{render_message, ViewPort};

/// Opening message sent when there is no history to replay
pub const GREETING: &str = "Hello MindMate";

pub const BOOTSTRAP_FAILURE: &str =
    "Sorry, I couldn't connect to the server. Please refresh to start a new conversation.";
pub const SEND_FAILURE: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";
pub const AUDIO_FAILURE: &str = "Could not process audio. Please try again.";
pub const SPEECH_FAILURE: &str = "Could not generate audio for this message.";
pub const PLAYBACK_FAILURE: &str = "Could not play the audio response.";
pub const MIC_PERMISSION_DENIED: &str =
    "Microphone access was denied. Please allow microphone access to use voice input.";
pub const MIC_NOT_FOUND: &str = "No microphone was found. Please connect a microphone and try again.";

/// An open capture session together with when it started
pub struct RecordingSession {
    capture: Box<dyn CaptureSession>,
    started_at: Instant,
}

/// Recording flag. The microphone is held from `Active` until `Stopping` ends.
#[derive(Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// Microphone requested, not yet granted
    Starting,
    Active(RecordingSession),
    /// Capture halted, device not yet released
    Stopping,
}

impl RecordingState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingState::Active(_))
    }
}

#[derive(Default)]
pub struct ClientState {
    pub mode: ChatMode,
    pub recording: RecordingState,
}

enum RecordingAction {
    Start,
    Stop(RecordingSession),
    Ignore,
}

#[derive(Clone)]
pub struct ChatClient {
    backend: Arc<dyn Backend>,
    view: Arc<dyn ViewPort>,
    microphone: Arc<dyn Microphone>,
    player: Arc<dyn AudioPlayer>,
    state: Arc<Mutex<ClientState>>,
}

impl ChatClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        view: Arc<dyn ViewPort>,
        microphone: Arc<dyn Microphone>,
        player: Arc<dyn AudioPlayer>,
        mode: ChatMode,
    ) -> Self {
        Self {
            backend,
            view,
            microphone,
            player,
            state: Arc::new(Mutex::new(ClientState {
                mode,
                recording: RecordingState::Idle,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        // State stays consistent across every transition, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> ChatMode {
        self.state().mode
    }

    pub fn is_recording(&self) -> bool {
        self.state().recording.is_active()
    }

    pub fn render_message(&self, sender: Sender, text: &str, speakable: bool) {
        self.view.render(render_message(&Message::new(sender, text, speakable)));
    }

    fn notify(&self, text: &str) {
        self.view.render(render_message(&Message::system(text)));
    }

    /// Replay history supplied by the server, or ask for an opening reply.
    pub async fn bootstrap(&self, history: &[HistoryEntry]) {
        if !history.is_empty() {
            tracing::debug!(entries = history.len(), "replaying history");
            for entry in history {
                self.view.render(render_message(&Message::from(entry)));
            }
            return;
        }

        let mode = self.mode();
        match self.backend.chat(GREETING, mode).await {
            Ok(reply) => self.render_message(Sender::MindMate, &reply, true),
            Err(e) => {
                tracing::warn!(error = %e, mode = mode.as_str(), "opening message failed");
                self.render_message(Sender::MindMate, BOOTSTRAP_FAILURE, false);
            }
        }
    }

    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        self.render_message(Sender::You, text, false);
        self.view.set_input("");

        let mode = self.mode();
        match self.backend.chat(text, mode).await {
            Ok(reply) => self.render_message(Sender::MindMate, &reply, true),
            Err(e) => {
                tracing::warn!(error = %e, mode = mode.as_str(), "chat request failed");
                self.render_message(Sender::MindMate, SEND_FAILURE, false);
            }
        }
    }

    /// Start recording when idle, stop and transcribe when recording.
    pub async fn toggle_recording(&self) {
        let action = {
            let mut state = self.state();
            match std::mem::take(&mut state.recording) {
                RecordingState::Idle => {
                    state.recording = RecordingState::Starting;
                    RecordingAction::Start
                }
                pending @ (RecordingState::Starting | RecordingState::Stopping) => {
                    state.recording = pending;
                    RecordingAction::Ignore
                }
                RecordingState::Active(session) => {
                    state.recording = RecordingState::Stopping;
                    RecordingAction::Stop(session)
                }
            }
        };

        match action {
            RecordingAction::Start => self.start_recording().await,
            RecordingAction::Stop(session) => self.stop_recording(session).await,
            RecordingAction::Ignore => tracing::debug!("microphone busy, toggle ignored"),
        }
    }

    async fn start_recording(&self) {
        match self.microphone.open().await {
            Ok(capture) => {
                self.state().recording = RecordingState::Active(RecordingSession {
                    capture,
                    started_at: Instant::now(),
                });
                self.view.set_recording(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not open microphone");
                self.state().recording = RecordingState::Idle;
                self.view.set_recording(false);
                let text = match e {
                    CaptureError::PermissionDenied => MIC_PERMISSION_DENIED.to_string(),
                    CaptureError::NoDevice => MIC_NOT_FOUND.to_string(),
                    CaptureError::Other(detail) => format!("Could not access the microphone: {detail}"),
                };
                self.notify(&text);
            }
        }
    }

    async fn stop_recording(&self, mut session: RecordingSession) {
        self.view.set_recording(false);
        let chunks = session.capture.finish().await;
        self.state().recording = RecordingState::Idle;
        tracing::info!(
            chunks = chunks.len(),
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            "recording stopped"
        );

        // Submit even when nothing was captured
        let clip = AudioClip::from_chunks(chunks);
        match self.backend.speech_to_text(clip).await {
            Ok(Transcription::Text(transcript)) => {
                self.view.set_input(&transcript);
                self.send_message(&transcript).await;
            }
            Ok(Transcription::Error(error)) => {
                self.notify(&error);
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                self.notify(AUDIO_FAILURE);
            }
        }
    }

    /// Synthesize `text` and play it.
    pub async fn speak_text(&self, text: &str) {
        let audio = match self.backend.text_to_speech(text).await {
            Ok(audio) => audio,
            Err(ApiError::Status { status, error }) => {
                tracing::warn!(status, error = ?error, "speech synthesis rejected");
                let text = error.unwrap_or_else(|| SPEECH_FAILURE.to_string());
                self.notify(&text);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                self.notify(SPEECH_FAILURE);
                return;
            }
        };

        if let Err(e) = self.player.play(audio).await {
            tracing::warn!(error = %e, "playback failed");
            self.notify(PLAYBACK_FAILURE);
        }
    }

    /// Set the mode, mark its selector and announce it.
    pub fn switch_mode(&self, mode: ChatMode) {
        self.state().mode = mode;
        self.view.set_mode_active(mode);
        self.notify(mode.announcement());
    }

    /// Mode selector handler: a different mode starts a fresh conversation.
    pub async fn select_mode(&self, mode: ChatMode) {
        if self.mode() == mode {
            return;
        }

        tracing::info!(mode = mode.as_str(), "switching mode");
        self.view.clear();
        self.switch_mode(mode);
        self.bootstrap(&[]).await;
    }

    /// Clear the conversation and request a new opening reply in the current mode.
    pub async fn refresh(&self) {
        self.view.clear();
        self.view.set_mode_active(self.mode());
        self.bootstrap(&[]).await;
    }
}
