//! Error types for backend calls and microphone access.

/// Errors returned by a [`Backend`](crate::api::Backend) call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, reset, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("Server returned {status}{}", .error.as_deref().map(|e| format!(": {e}")).unwrap_or_default())]
    Status {
        status: u16,
        /// `error` field of the JSON body, when the server sent one.
        error: Option<String>,
    },

    /// The response body was not what the endpoint promises.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Why the microphone could not be opened.
///
/// These are the only failure categories the conversation distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("No microphone found")]
    NoDevice,

    #[error("Microphone error: {0}")]
    Other(String),
}

/// Failure to play synthesized audio locally.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio player failed: {0}")]
    Player(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
