//! Maps stage errors onto the response error taxonomy.
//!
//! This is the only place that decides what text the parent sees for a
//! failed job.

use crate::error::ScanscribeError;

/// Response-level error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    FileNotFound,
    FileTooSmall,
    FileTooLarge,
    CorruptAudio,
    ValidationTimeout,
    DecodeError,
    UnsupportedInputType,
    ToneDetectionUnavailable,
    BackendOutOfMemory,
    BackendFailure,
    UnexpectedServerError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::FileTooSmall => "file_too_small",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::CorruptAudio => "corrupt_audio",
            ErrorKind::ValidationTimeout => "validation_timeout",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::UnsupportedInputType => "unsupported_input_type",
            ErrorKind::ToneDetectionUnavailable => "tone_detection_unavailable",
            ErrorKind::BackendOutOfMemory => "backend_out_of_memory",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::UnexpectedServerError => "unexpected_server_error",
        }
    }
}

/// Error text fragments that mean the backend choked on the audio itself.
/// `1094995529` is FFmpeg's `AVERROR_INVALIDDATA`.
const CORRUPT_MARKERS: [&str; 2] = ["[Errno 1094995529]", "Invalid data found"];

/// A classified failure, ready to become an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: ErrorKind,
    pub message: String,
}

/// Classify `err` raised while serving job `job_id`.
pub fn classify(err: &ScanscribeError, job_id: &str) -> Classified {
    use ScanscribeError as E;

    let (kind, message) = match err {
        E::UnknownCommand(_) | E::MissingInput | E::Json(_) => {
            (ErrorKind::InvalidRequest, err.to_string())
        }
        E::FileNotFound(_) | E::FileVanished(_) => (ErrorKind::FileNotFound, err.to_string()),
        E::FileTooSmall { .. } => (ErrorKind::FileTooSmall, err.to_string()),
        E::FileTooLarge { .. } => (ErrorKind::FileTooLarge, err.to_string()),
        E::CorruptAudio(_) => (ErrorKind::CorruptAudio, err.to_string()),
        E::ValidationTimeout(_) => (ErrorKind::ValidationTimeout, err.to_string()),
        E::InvalidBase64 | E::EmptyPayload | E::Decode(_) => {
            (ErrorKind::DecodeError, err.to_string())
        }
        E::UnsupportedInput => (ErrorKind::UnsupportedInputType, err.to_string()),
        E::ToneDetectionUnavailable => (ErrorKind::ToneDetectionUnavailable, err.to_string()),
        E::ToneDetection(_) => (ErrorKind::BackendFailure, err.to_string()),
        E::Backend(msg) => classify_backend(msg, job_id),
        other => (
            ErrorKind::UnexpectedServerError,
            unexpected_message(&other.to_string()),
        ),
    };
    Classified { kind, message }
}

fn classify_backend(msg: &str, job_id: &str) -> (ErrorKind, String) {
    let lower = msg.to_ascii_lowercase();
    if CORRUPT_MARKERS.iter().any(|m| msg.contains(m)) || lower.contains("corrupt") {
        return (
            ErrorKind::CorruptAudio,
            format!("Corrupt audio data for ID {job_id}."),
        );
    }
    if lower.contains("memory") {
        return (
            ErrorKind::BackendOutOfMemory,
            format!("Out of memory during transcription for ID {job_id}."),
        );
    }
    (
        ErrorKind::BackendFailure,
        format!("Error during transcription for ID {job_id}: {msg}"),
    )
}

/// Text for a failure nothing else claimed, including panics caught at the
/// loop boundary.
pub fn unexpected_message(detail: &str) -> String {
    format!("Unexpected server error: {detail}")
}
