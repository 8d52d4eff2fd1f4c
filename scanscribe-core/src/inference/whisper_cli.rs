//! whisper.cpp command-line backend (`whisper-cli`).
//!
//! Each call runs the CLI once with `-oj` and reads segments back from the
//! JSON file it writes. Decoded inline buffers are written to a temporary
//! 16-bit WAV first; the temp directory is removed when the call returns.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{SpeechBackend, TranscriptSegment, TranscriptionParams};
use crate::audio::{AudioChunk, AudioSource};
use crate::config::{ComputeDevice, WhisperSettings};
use crate::error::{Result, ScanscribeError};
use crate::process;

#[derive(Debug, Clone)]
pub struct WhisperCliConfig {
    pub program: String,
    pub model_path: PathBuf,
    pub vad_model: Option<PathBuf>,
    pub device: ComputeDevice,
    pub timeout: Duration,
}

impl WhisperCliConfig {
    pub fn new(model: &str, device: ComputeDevice, settings: &WhisperSettings) -> Self {
        Self {
            program: settings.cli_bin.clone(),
            model_path: resolve_model_path(model, &settings.model_dir),
            vad_model: settings
                .vad_model
                .as_deref()
                .map(|vad| resolve_model_path(vad, &settings.model_dir)),
            device,
            timeout: settings.timeout,
        }
    }
}

/// A model id that names an existing file is used as-is, otherwise it maps
/// to `<model_dir>/ggml-<id>.bin`.
pub fn resolve_model_path(model: &str, model_dir: &Path) -> PathBuf {
    let direct = PathBuf::from(model);
    if direct.is_file() {
        return direct;
    }
    model_dir.join(format!("ggml-{model}.bin"))
}

pub struct WhisperCliBackend {
    config: WhisperCliConfig,
}

impl WhisperCliBackend {
    pub fn new(config: WhisperCliConfig) -> Self {
        Self { config }
    }

    /// Rebuild a runner error from exit status and stderr alone, with job
    /// paths and the prompt masked. Never carries the argv.
    fn failure(
        &self,
        err: ScanscribeError,
        input: &Path,
        params: &TranscriptionParams,
    ) -> ScanscribeError {
        let detail = match err {
            ScanscribeError::CommandFailed {
                status,
                stderr_suffix,
                ..
            } => format!("whisper-cli exited with status {status}{stderr_suffix}"),
            ScanscribeError::CommandTimedOut {
                timeout_ms,
                stderr_suffix,
                ..
            } => format!("whisper-cli timed out after {timeout_ms}ms{stderr_suffix}"),
            other => other.to_string(),
        };

        let input = input.display().to_string();
        let model = self.config.model_path.display().to_string();
        let vad = self.config.vad_model.as_ref().map(|p| p.display().to_string());
        let masks = [
            (Some(input.as_str()), "<input>"),
            (Some(model.as_str()), "<model>"),
            (vad.as_deref(), "<vad-model>"),
            (params.prompt.as_deref(), "<prompt>"),
        ];
        ScanscribeError::Backend(mask(&detail, &masks))
    }
}

fn mask(text: &str, masks: &[(Option<&str>, &str)]) -> String {
    masks
        .iter()
        .filter_map(|(value, label)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (v, *label))
        })
        .fold(text.to_owned(), |acc, (value, label)| acc.replace(value, label))
}

impl SpeechBackend for WhisperCliBackend {
    fn warm_up(&mut self) -> Result<()> {
        if !process::command_exists(&self.config.program) {
            return Err(ScanscribeError::CommandMissing {
                command: self.config.program.clone(),
            });
        }
        if !self.config.model_path.is_file() {
            return Err(ScanscribeError::ModelNotFound {
                path: self.config.model_path.clone(),
            });
        }
        match &self.config.vad_model {
            Some(vad) if !vad.is_file() => {
                warn!(
                    vad_model = %vad.display(),
                    "VAD model file not found, voice activity filtering is disabled"
                );
                self.config.vad_model = None;
            }
            Some(_) => {}
            None => warn!("voice activity filtering disabled by configuration"),
        }
        info!(
            program = %self.config.program,
            model = %self.config.model_path.display(),
            device = self.config.device.as_str(),
            "whisper.cpp backend ready"
        );
        Ok(())
    }

    fn transcribe(
        &mut self,
        audio: &AudioSource,
        params: &TranscriptionParams,
    ) -> Result<Vec<TranscriptSegment>> {
        let work_dir = tempfile::Builder::new()
            .prefix("scanscribe-")
            .tempdir()?;

        let input = match audio {
            AudioSource::File(path) => path.clone(),
            AudioSource::Samples(chunk) => {
                let wav = work_dir.path().join("input.wav");
                write_wav(&wav, chunk)?;
                wav
            }
        };
        let output_prefix = work_dir.path().join("whisper_output");
        let args = build_args(&self.config, params, &input, &output_prefix);

        let started = Instant::now();
        process::run_checked(&self.config.program, &args, self.config.timeout)
            .map_err(|e| self.failure(e, &input, params))?;

        let json_path = output_prefix.with_extension("json");
        let raw = fs::read_to_string(&json_path).map_err(|e| {
            ScanscribeError::Backend(format!("whisper-cli produced no JSON output: {e}"))
        })?;
        let root: Value = serde_json::from_str(&raw)
            .map_err(|e| ScanscribeError::Backend(format!("unreadable whisper-cli JSON: {e}")))?;
        let segments = segments_from_json(&root);

        debug!(
            segments = segments.len(),
            vad = params.vad_filter,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "whisper-cli finished"
        );
        Ok(segments)
    }
}

pub(crate) fn build_args(
    cfg: &WhisperCliConfig,
    params: &TranscriptionParams,
    input: &Path,
    output_prefix: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-m".to_owned(),
        cfg.model_path.display().to_string(),
        "-f".to_owned(),
        input.display().to_string(),
        "-of".to_owned(),
        output_prefix.display().to_string(),
        "-oj".to_owned(),
        "-l".to_owned(),
        params.language.clone(),
        "-bs".to_owned(),
        params.beam_size.to_string(),
    ];

    if params.vad_filter {
        if let Some(vad_model) = &cfg.vad_model {
            args.push("--vad".to_owned());
            args.push("--vad-model".to_owned());
            args.push(vad_model.display().to_string());
            args.push("--vad-min-silence-duration-ms".to_owned());
            args.push(params.min_silence_ms.to_string());
        }
    }

    if let Some(prompt) = params.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        args.push("--prompt".to_owned());
        args.push(prompt.to_owned());
    }

    if !params.condition_on_previous_text {
        args.push("-mc".to_owned());
        args.push("0".to_owned());
    }

    if params.word_timestamps {
        args.push("-ml".to_owned());
        args.push("1".to_owned());
        args.push("-sow".to_owned());
    }

    if cfg.device == ComputeDevice::Cpu {
        args.push("-ng".to_owned());
    }

    args
}

fn write_wav(path: &Path, chunk: &AudioChunk) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: chunk.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_backend = |e: hound::Error| ScanscribeError::Backend(format!("temp wav: {e}"));
    let mut writer = hound::WavWriter::create(path, spec).map_err(to_backend)?;
    for &s in &chunk.samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(v).map_err(to_backend)?;
    }
    writer.finalize().map_err(to_backend)
}

pub(crate) fn segments_from_json(root: &Value) -> Vec<TranscriptSegment> {
    let Some(items) = root.get("transcription").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let text = item.get("text").and_then(Value::as_str)?;
            let offsets = item.get("offsets");
            Some(TranscriptSegment {
                text: text.to_owned(),
                start_ms: offsets.and_then(|o| o.get("from")).and_then(Value::as_i64),
                end_ms: offsets.and_then(|o| o.get("to")).and_then(Value::as_i64),
            })
        })
        .collect()
}
