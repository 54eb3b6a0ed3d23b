pub mod api;
pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod mode;
pub mod state;
pub mod view;

// Re-export main types for convenience
pub use api::{Backend, MindMateApi, Session, Transcription};
pub use audio::{AudioClip, AudioPlayer, CaptureSession, CommandMicrophone, CommandPlayer, Microphone};
pub use client::ChatClient;
pub use config::Config;
pub use error::{ApiError, CaptureError, PlaybackError};
pub use mode::ChatMode;
pub use state::{HistoryEntry, HistoryRole, Message, Sender};
pub use view::{RenderedLine, ViewPort, ViewUpdate};
