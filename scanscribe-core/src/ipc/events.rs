//! Lines written to stdout for the parent controller.
//!
//! | Line | Shape |
//! |------|-------|
//! | `ReadySignal` | `{"ready": true}` |
//! | `Heartbeat` | `{"heartbeat": true, "timestamp": 1718000000.25}` |
//! | `Response::Transcription` | `{"id": "..", "transcription": ".."}` |
//! | `Response::Tones` | `{"id": "..", "has_two_tone": true, "detected_tones": [..], "file_path": ".."}` |
//! | `Response::Error` | `{"id": "..", "error": ".."}` |
//!
//! Field order is stable: these are plain structs, never maps.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Written exactly once, after startup validation, before the first read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadySignal {
    pub ready: bool,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self { ready: true }
    }
}

/// Written when the loop has been idle for the heartbeat interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Heartbeat {
    pub heartbeat: bool,
    /// Seconds since the Unix epoch, fractional.
    pub timestamp: f64,
}

impl Heartbeat {
    pub fn now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros();
        Self {
            heartbeat: true,
            timestamp: micros as f64 / 1_000_000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Job responses
// ---------------------------------------------------------------------------

/// One tone event in a `detect_tones` response.
///
/// Only the fields the detected category produced are serialised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedTone {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_b: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_b: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<u32>,
}

/// The single line answering one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Transcription {
        id: String,
        transcription: String,
    },
    Tones {
        id: String,
        has_two_tone: bool,
        detected_tones: Vec<DetectedTone>,
        file_path: String,
    },
    Error {
        id: String,
        error: String,
    },
}

impl Response {
    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Response::Error {
            id: id.into(),
            error: error.into(),
        }
    }
}

/// Serialise `value` as one line and flush, so the parent sees it immediately.
pub fn write_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
