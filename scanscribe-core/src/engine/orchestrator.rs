//! Transcription retry policy.
//!
//! ```text
//! FirstPass(VAD on) ──text──► done
//!        │ empty
//!        ▼
//! SecondPass(VAD off) ──► done (possibly "")
//! ```
//!
//! The VAD filter can swallow short radio transmissions entirely, so an empty
//! first pass gets exactly one unfiltered retry. Backend errors are returned
//! as-is and never retried.

use tracing::{debug, info};

use crate::audio::AudioSource;
use crate::config::TranscriptionConfig;
use crate::error::Result;
use crate::inference::{join_segments, SpeechBackend, TranscriptionParams};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutcome {
    /// Space-joined, trimmed text. Empty when nothing was recognised.
    pub text: String,
    /// 1 or 2.
    pub passes: u8,
}

pub fn transcribe(
    backend: &mut dyn SpeechBackend,
    audio: &AudioSource,
    cfg: &TranscriptionConfig,
) -> Result<TranscriptionOutcome> {
    let first = TranscriptionParams::first_pass(cfg);
    let text = join_segments(&backend.transcribe(audio, &first)?);
    if !text.is_empty() {
        debug!(chars = text.len(), "first pass produced text");
        return Ok(TranscriptionOutcome { text, passes: 1 });
    }

    info!("first pass empty, retrying without VAD");
    let second = first.without_vad();
    let text = join_segments(&backend.transcribe(audio, &second)?);
    if text.is_empty() {
        info!("no speech found after retry");
    }
    Ok(TranscriptionOutcome { text, passes: 2 })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::ScanscribeError;
    use crate::inference::TranscriptSegment;

    /// Replies from a script and records every parameter set it sees.
    struct ScriptedBackend {
        replies: Vec<Result<Vec<TranscriptSegment>>>,
        calls: Arc<Mutex<Vec<TranscriptionParams>>>,
    }

    impl SpeechBackend for ScriptedBackend {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn transcribe(
            &mut self,
            _audio: &AudioSource,
            params: &TranscriptionParams,
        ) -> Result<Vec<TranscriptSegment>> {
            self.calls.lock().push(params.clone());
            if self.replies.is_empty() {
                return Ok(Vec::new());
            }
            self.replies.remove(0)
        }
    }

    fn backend(
        replies: Vec<Result<Vec<TranscriptSegment>>>,
    ) -> (ScriptedBackend, Arc<Mutex<Vec<TranscriptionParams>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            ScriptedBackend {
                replies,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn audio() -> AudioSource {
        AudioSource::File(PathBuf::from("/tmp/clip.wav"))
    }

    #[test]
    fn text_on_first_pass_skips_retry() {
        let (mut b, calls) = backend(vec![Ok(vec![TranscriptSegment::text(" Medic 4 ")])]);
        let out = transcribe(&mut b, &audio(), &TranscriptionConfig::default()).expect("ok");
        assert_eq!(out.text, "Medic 4");
        assert_eq!(out.passes, 1);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn empty_first_pass_retries_once_without_vad() {
        let (mut b, calls) = backend(vec![
            Ok(vec![TranscriptSegment::text("  ")]),
            Ok(vec![TranscriptSegment::text("Ladder 9 en route")]),
        ]);
        let cfg = TranscriptionConfig {
            prompt: Some("Ladder".into()),
            ..TranscriptionConfig::default()
        };
        let out = transcribe(&mut b, &audio(), &cfg).expect("ok");
        assert_eq!(out.text, "Ladder 9 en route");
        assert_eq!(out.passes, 2);

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].vad_filter);
        assert!(!calls[1].vad_filter);
        assert_eq!(calls[1], calls[0].without_vad());
    }

    #[test]
    fn empty_after_both_passes_is_success() {
        let (mut b, calls) = backend(vec![Ok(vec![]), Ok(vec![])]);
        let out = transcribe(&mut b, &audio(), &TranscriptionConfig::default()).expect("ok");
        assert_eq!(out.text, "");
        assert_eq!(out.passes, 2);
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn backend_failure_is_not_retried() {
        let (mut b, calls) = backend(vec![Err(ScanscribeError::Backend("boom".into()))]);
        let err = transcribe(&mut b, &audio(), &TranscriptionConfig::default()).unwrap_err();
        assert!(matches!(err, ScanscribeError::Backend(_)));
        assert_eq!(calls.lock().len(), 1);
    }
}
