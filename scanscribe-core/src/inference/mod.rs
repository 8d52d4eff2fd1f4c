//! Speech backend abstraction.
//!
//! The `SpeechBackend` trait decouples the orchestrator from any specific
//! recogniser (whisper.cpp CLI, test doubles, ...).
//!
//! `&mut self` on `transcribe` expresses that backends may hold decoder state
//! between calls. The worker owns exactly one backend and drives it from a
//! single thread, so no lock is needed.

pub mod whisper_cli;

pub use whisper_cli::{WhisperCliBackend, WhisperCliConfig};

use crate::audio::AudioSource;
use crate::config::TranscriptionConfig;
use crate::error::Result;

/// Contract for speech recognition backends.
pub trait SpeechBackend: Send {
    /// One-time startup check: weights present, binary runnable.
    ///
    /// # Errors
    /// Returns an error if the model or runtime is missing. Fatal before ready.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe a file or a decoded 16 kHz buffer.
    ///
    /// # Returns
    /// Segments in playback order. May be empty if no speech was found.
    fn transcribe(
        &mut self,
        audio: &AudioSource,
        params: &TranscriptionParams,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// One recognised span of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl TranscriptSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_ms: None,
            end_ms: None,
        }
    }
}

/// Space-join segment texts and trim the result.
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decoding parameters for a single backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionParams {
    pub language: String,
    pub beam_size: u32,
    pub vad_filter: bool,
    pub min_silence_ms: u32,
    pub prompt: Option<String>,
    pub word_timestamps: bool,
    pub condition_on_previous_text: bool,
}

impl TranscriptionParams {
    /// Parameters for the first pass of every job: VAD on.
    pub fn first_pass(cfg: &TranscriptionConfig) -> Self {
        Self {
            language: cfg.language.clone(),
            beam_size: cfg.beam_size,
            vad_filter: true,
            min_silence_ms: cfg.vad_min_silence_ms,
            prompt: cfg.prompt.clone(),
            word_timestamps: false,
            condition_on_previous_text: false,
        }
    }

    /// Same parameters with the voice-activity filter turned off.
    pub fn without_vad(&self) -> Self {
        Self {
            vad_filter: false,
            ..self.clone()
        }
    }
}
