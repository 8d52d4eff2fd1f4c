//! Integrity checks for file inputs, run right before expensive work.
//!
//! Order: existence, size bounds, structural probe. The first failure wins and
//! the backend is never reached.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, ScanscribeError};
use crate::process;

pub const DEFAULT_MIN_BYTES: u64 = 1_000;
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub probe_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Result of a structural probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    /// The probe ran and rejected the file.
    Failed,
    TimedOut,
    /// The probe could not be run at all. Not held against the file.
    Unavailable(String),
}

/// Something that can tell whether a file parses as a media container.
pub trait StructuralProbe {
    fn probe(&self, path: &Path, timeout: Duration) -> ProbeOutcome;
}

/// `ffprobe -v quiet -show_format <path>`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl StructuralProbe for FfprobeProbe {
    fn probe(&self, path: &Path, timeout: Duration) -> ProbeOutcome {
        let args = vec![
            "-v".to_owned(),
            "quiet".to_owned(),
            "-show_format".to_owned(),
            path.to_string_lossy().into_owned(),
        ];
        match process::run_with_timeout(&self.program, &args, timeout) {
            Ok(output) if output.status.success() => ProbeOutcome::Ok,
            Ok(_) => ProbeOutcome::Failed,
            Err(ScanscribeError::CommandTimedOut { .. }) => ProbeOutcome::TimedOut,
            Err(e) => ProbeOutcome::Unavailable(e.to_string()),
        }
    }
}

/// Validate a file input against `cfg`, probing with `probe`.
///
/// # Errors
/// `FileVanished`, `FileTooSmall`, `FileTooLarge`, `CorruptAudio`,
/// `ValidationTimeout`.
pub fn validate(path: &Path, cfg: &ValidatorConfig, probe: &dyn StructuralProbe) -> Result<()> {
    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Err(ScanscribeError::FileVanished(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanscribeError::FileVanished(path.to_path_buf()))
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "cannot stat audio file, skipping validation"
            );
            return Ok(());
        }
    };

    if size < cfg.min_bytes {
        return Err(ScanscribeError::FileTooSmall {
            path: path.to_path_buf(),
            size,
        });
    }
    if size > cfg.max_bytes {
        return Err(ScanscribeError::FileTooLarge {
            path: path.to_path_buf(),
            size,
        });
    }

    match probe.probe(path, cfg.probe_timeout) {
        ProbeOutcome::Ok => {
            debug!(path = %path.display(), size, "audio file validated");
            Ok(())
        }
        ProbeOutcome::Failed => Err(ScanscribeError::CorruptAudio(path.to_path_buf())),
        ProbeOutcome::TimedOut => Err(ScanscribeError::ValidationTimeout(path.to_path_buf())),
        ProbeOutcome::Unavailable(reason) => {
            warn!(path = %path.display(), %reason, "structural probe unavailable, skipping");
            Ok(())
        }
    }
}
