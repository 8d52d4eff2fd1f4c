use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by scanscribe-core.
///
/// Stage functions return these as values; the classifier in
/// [`crate::classify`] is the only place that turns them into response text.
#[derive(Debug, Error)]
pub enum ScanscribeError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    ConfigMissing(Vec<String>),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid command: {0}")]
    UnknownCommand(String),

    #[error("Invalid command format: missing 'path' or 'audio_data_base64'.")]
    MissingInput,

    #[error("Audio file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Audio file not found: {}", .0.display())]
    FileVanished(PathBuf),

    #[error("Audio file too small: {size} bytes")]
    FileTooSmall { path: PathBuf, size: u64 },

    #[error("Audio file too large: {size} bytes")]
    FileTooLarge { path: PathBuf, size: u64 },

    #[error("Corrupt audio file (ffprobe check): {}", .0.display())]
    CorruptAudio(PathBuf),

    #[error("File validation timeout: {}", .0.display())]
    ValidationTimeout(PathBuf),

    #[error("Invalid Base64 data received.")]
    InvalidBase64,

    #[error("Decoded audio data is empty.")]
    EmptyPayload,

    #[error("Error processing audio buffer: {0}")]
    Decode(String),

    #[error("Tone detection requires 'path' parameter.")]
    UnsupportedInput,

    #[error("Tone detection is not available. Please install icad-tone-detection.")]
    ToneDetectionUnavailable,

    #[error("Error during tone detection: {0}")]
    ToneDetection(String),

    /// Raw failure text reported by the inference backend.
    #[error("{0}")]
    Backend(String),

    #[error("model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("missing command `{command}` on PATH")]
    CommandMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {timeout_ms}ms: `{command}`{stderr_suffix}")]
    CommandTimedOut {
        command: String,
        timeout_ms: u64,
        stderr_suffix: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanscribeError {
    pub fn from_command_failure(command: String, status: i32, stderr: &str) -> Self {
        Self::CommandFailed {
            command,
            status,
            stderr_suffix: stderr_suffix(stderr),
        }
    }

    pub fn from_command_timeout(command: String, timeout_ms: u64, stderr: &str) -> Self {
        Self::CommandTimedOut {
            command,
            timeout_ms,
            stderr_suffix: stderr_suffix(stderr),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("; stderr: {trimmed}")
    }
}

pub type Result<T> = std::result::Result<T, ScanscribeError>;
