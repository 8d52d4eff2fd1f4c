//! Incoming job records, one JSON object per stdin line.
//!
//! ```text
//! {"id": "...", "command": "transcribe",   "path": "..."}
//! {"id": "...", "command": "transcribe",   "audio_data_base64": "..."}
//! {"id": "...", "command": "detect_tones", "path": "..."}
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ScanscribeError;

/// What the parent asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Transcribe,
    DetectTones,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Transcribe => "transcribe",
            Command::DetectTones => "detect_tones",
        }
    }
}

/// Where the audio for a job lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    /// File on the filesystem shared with the parent.
    Path(PathBuf),
    /// Base64-encoded audio container embedded in the request.
    Inline(String),
}

impl JobInput {
    pub fn kind(&self) -> &'static str {
        match self {
            JobInput::Path(_) => "path",
            JobInput::Inline(_) => "buffer",
        }
    }
}

/// A fully parsed job. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub command: Command,
    pub input: JobInput,
}

/// Why a line did not become a [`Job`].
#[derive(Debug)]
pub enum JobParseError {
    /// Not a JSON object. No id to answer to.
    Unparsable(String),
    /// JSON object without a non-empty string `id`. No id to answer to.
    MissingId,
    /// Identifiable but invalid; the parent gets an error response.
    Rejected { id: String, error: ScanscribeError },
}

#[derive(Debug, Deserialize)]
struct JobRecord {
    #[serde(default)]
    command: Option<Value>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    audio_data_base64: Option<String>,
}

/// Parse one protocol line.
pub fn parse_job(line: &str) -> Result<Job, JobParseError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| JobParseError::Unparsable(e.to_string()))?;
    if !value.is_object() {
        return Err(JobParseError::Unparsable("expected a JSON object".into()));
    }

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or(JobParseError::MissingId)?;

    let record: JobRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            return Err(JobParseError::Rejected {
                id,
                error: ScanscribeError::Json(e),
            })
        }
    };

    let command = match record.command.as_ref().and_then(Value::as_str) {
        Some("transcribe") => Command::Transcribe,
        Some("detect_tones") => Command::DetectTones,
        Some(other) => {
            return Err(JobParseError::Rejected {
                id,
                error: ScanscribeError::UnknownCommand(other.to_owned()),
            })
        }
        None => {
            let shown = record
                .command
                .map(|v| v.to_string())
                .unwrap_or_else(|| "None".into());
            return Err(JobParseError::Rejected {
                id,
                error: ScanscribeError::UnknownCommand(shown),
            });
        }
    };

    let input = match (record.path, record.audio_data_base64) {
        (Some(path), _) => JobInput::Path(PathBuf::from(path)),
        (None, Some(encoded)) => JobInput::Inline(encoded),
        (None, None) => {
            let error = match command {
                Command::Transcribe => ScanscribeError::MissingInput,
                Command::DetectTones => ScanscribeError::UnsupportedInput,
            };
            return Err(JobParseError::Rejected { id, error });
        }
    };

    Ok(Job { id, command, input })
}
