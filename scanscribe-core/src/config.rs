//! Worker configuration from the process environment.
//!
//! Everything is read once at startup. Required values that are missing
//! abort startup before the ready signal; optional values that fail to parse
//! fall back to their defaults with a warning.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, ScanscribeError};
use crate::process;
use crate::tones::{self, DetectionMode, ToneDetectionParams, ToneOverrides};
use crate::validate::{self, ValidatorConfig};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(600);
/// Silero VAD model id, resolved to `<model_dir>/ggml-<id>.bin`.
pub const DEFAULT_VAD_MODEL: &str = "silero-v5.1.2";

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Mps,
}

impl ComputeDevice {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::Mps => "mps",
        }
    }

    /// Numeric precision used on this device.
    pub fn compute_type(self) -> &'static str {
        match self {
            ComputeDevice::Mps => "float32",
            ComputeDevice::Cuda => "float16",
            ComputeDevice::Cpu => "int8",
        }
    }

    /// Next device to try when this one is unavailable.
    pub fn fallback(self) -> Option<ComputeDevice> {
        match self {
            ComputeDevice::Mps => Some(ComputeDevice::Cuda),
            ComputeDevice::Cuda => Some(ComputeDevice::Cpu),
            ComputeDevice::Cpu => None,
        }
    }

    /// Walk the fallback chain until `available` accepts a device. CPU is
    /// always accepted.
    pub fn resolve_with<F>(self, available: F) -> ComputeDevice
    where
        F: Fn(ComputeDevice) -> bool,
    {
        let mut device = self;
        loop {
            if device == ComputeDevice::Cpu || available(device) {
                return device;
            }
            let next = device.fallback().unwrap_or(ComputeDevice::Cpu);
            warn!(
                requested = device.as_str(),
                fallback = next.as_str(),
                "compute device unavailable, falling back"
            );
            device = next;
        }
    }

    pub fn resolve(self) -> ComputeDevice {
        self.resolve_with(device_available)
    }
}

fn device_available(device: ComputeDevice) -> bool {
    match device {
        ComputeDevice::Cpu => true,
        ComputeDevice::Mps => cfg!(all(target_os = "macos", target_arch = "aarch64")),
        ComputeDevice::Cuda => process::command_exists("nvidia-smi"),
    }
}

pub fn normalize_device(raw: &str) -> ComputeDevice {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cpu" => ComputeDevice::Cpu,
        "cuda" | "gpu" | "nvidia" => ComputeDevice::Cuda,
        "mps" | "metal" => ComputeDevice::Mps,
        other => {
            warn!(value = other, "unknown TRANSCRIPTION_DEVICE, using cpu");
            ComputeDevice::Cpu
        }
    }
}

pub fn normalize_language(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "en" | "eng" | "english" => "en".into(),
        "auto" => "auto".into(),
        other => other.into(),
    }
}

/// Job-invariant transcription settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionConfig {
    pub language: String,
    pub beam_size: u32,
    pub vad_min_silence_ms: u32,
    pub prompt: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            beam_size: 3,
            vad_min_silence_ms: 750,
            prompt: None,
        }
    }
}

/// Settings for the whisper.cpp command-line backend.
#[derive(Debug, Clone)]
pub struct WhisperSettings {
    pub model_dir: PathBuf,
    pub cli_bin: String,
    /// VAD model id or path; `None` turns voice activity filtering off.
    pub vad_model: Option<String>,
    pub timeout: Duration,
}

/// Settings for the external tone detector.
#[derive(Debug, Clone)]
pub struct ToneSettings {
    pub bin: String,
    pub timeout: Duration,
    pub mode: DetectionMode,
    pub params: ToneDetectionParams,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Model id or path, as given.
    pub model: String,
    pub requested_device: ComputeDevice,
    pub transcription: TranscriptionConfig,
    pub validator: ValidatorConfig,
    pub ffprobe_bin: String,
    pub heartbeat_interval: Duration,
    pub whisper: WhisperSettings,
    pub tones: ToneSettings,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// # Errors
    /// `ConfigMissing` listing every absent required variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let model = get("WHISPER_MODEL");
        let device = get("TRANSCRIPTION_DEVICE");
        let (model, device) = match (model, device) {
            (Some(m), Some(d)) => (m, d),
            (m, d) => {
                let mut missing = Vec::new();
                if m.is_none() {
                    missing.push("WHISPER_MODEL".to_owned());
                }
                if d.is_none() {
                    missing.push("TRANSCRIPTION_DEVICE".to_owned());
                }
                return Err(ScanscribeError::ConfigMissing(missing));
            }
        };

        let number = |key: &str, default: u64| -> u64 {
            match get(key) {
                None => default,
                Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                    warn!(variable = key, value = %raw, default, "invalid number, using default");
                    default
                }),
            }
        };
        let secs = |key: &str, default: Duration| -> Duration {
            Duration::from_secs(number(key, default.as_secs()).max(1))
        };

        let transcription = TranscriptionConfig {
            language: normalize_language(&get("TRANSCRIPTION_LANGUAGE").unwrap_or_default()),
            beam_size: number("TRANSCRIPTION_BEAM_SIZE", 3).clamp(1, 16) as u32,
            vad_min_silence_ms: number("VAD_MIN_SILENCE_MS", 750).min(60_000) as u32,
            prompt: get("OPENAI_TRANSCRIPTION_PROMPT"),
        };

        let mut validator = ValidatorConfig {
            min_bytes: number("AUDIO_MIN_BYTES", validate::DEFAULT_MIN_BYTES),
            max_bytes: number("AUDIO_MAX_BYTES", validate::DEFAULT_MAX_BYTES),
            probe_timeout: secs("FFPROBE_TIMEOUT_SECS", validate::DEFAULT_PROBE_TIMEOUT),
        };
        if validator.max_bytes < validator.min_bytes {
            warn!(
                min = validator.min_bytes,
                max = validator.max_bytes,
                "AUDIO_MAX_BYTES below AUDIO_MIN_BYTES, using default bounds"
            );
            validator.min_bytes = validate::DEFAULT_MIN_BYTES;
            validator.max_bytes = validate::DEFAULT_MAX_BYTES;
        }

        let mode = tones::normalize_detection_mode(get("TONE_DETECTION_TYPE").as_deref());
        let overrides = ToneOverrides::from_lookup(&lookup);

        Ok(Self {
            model,
            requested_device: normalize_device(&device),
            transcription,
            validator,
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".into()),
            heartbeat_interval: secs("HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL),
            whisper: WhisperSettings {
                model_dir: PathBuf::from(get("WHISPER_MODEL_DIR").unwrap_or_else(|| "./models".into())),
                cli_bin: get("WHISPER_CLI_BIN").unwrap_or_else(|| "whisper-cli".into()),
                vad_model: vad_model_setting(get("WHISPER_VAD_MODEL")),
                timeout: secs("BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT),
            },
            tones: ToneSettings {
                bin: get("TONE_DETECT_BIN").unwrap_or_else(|| tones::icad::DEFAULT_BIN.into()),
                timeout: secs("TONE_DETECT_TIMEOUT_SECS", tones::icad::DEFAULT_TIMEOUT),
                mode,
                params: ToneDetectionParams::merged(mode, &overrides),
            },
        })
    }

    pub fn log_summary(&self, device: ComputeDevice) {
        info!(
            model = %self.model,
            requested_device = self.requested_device.as_str(),
            device = device.as_str(),
            compute_type = device.compute_type(),
            language = %self.transcription.language,
            beam_size = self.transcription.beam_size,
            vad_min_silence_ms = self.transcription.vad_min_silence_ms,
            has_prompt = self.transcription.prompt.is_some(),
            heartbeat_secs = self.heartbeat_interval.as_secs(),
            tone_mode = self.tones.mode.as_str(),
            "worker configuration loaded"
        );
    }
}

fn vad_model_setting(raw: Option<String>) -> Option<String> {
    match raw {
        None => Some(DEFAULT_VAD_MODEL.to_owned()),
        Some(v) if matches!(v.to_ascii_lowercase().as_str(), "none" | "off" | "false" | "0") => None,
        Some(v) => Some(v),
    }
}
