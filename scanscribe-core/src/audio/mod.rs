//! Audio input resolution.
//!
//! ## Flow
//!
//! ```text
//! JobInput::Path(p)    ──exists?──►  AudioSource::File(p)
//! JobInput::Inline(b64) ─base64─► bytes ─symphonia─► mono f32 ─rubato─► AudioSource::Samples(16 kHz)
//! ```
//!
//! Path inputs are never read here; the integrity validator and the backend
//! open them later. Inline payloads are decoded exactly once and the
//! intermediate buffers are released as soon as the next stage has its copy.

pub mod chunk;
pub mod decode;
pub mod resample;

use std::path::{Path, PathBuf};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

pub use chunk::AudioChunk;

use crate::error::{Result, ScanscribeError};
use crate::ipc::job::JobInput;

/// Sample rate every inference backend expects.
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Standard alphabet, padding optional. Parents differ on whether they pad.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Audio ready for validation and inference.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// A file known to exist at resolution time.
    File(PathBuf),
    /// Decoded mono samples at [`MODEL_SAMPLE_RATE`].
    Samples(AudioChunk),
}

impl AudioSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            AudioSource::File(p) => Some(p),
            AudioSource::Samples(_) => None,
        }
    }
}

/// Turn a job's input descriptor into an [`AudioSource`].
///
/// # Errors
/// - `FileNotFound` for a path that is not a regular file.
/// - `InvalidBase64`, `EmptyPayload`, `Decode` for inline payloads.
pub fn resolve(input: &JobInput) -> Result<AudioSource> {
    match input {
        JobInput::Path(path) => {
            if !path.is_file() {
                return Err(ScanscribeError::FileNotFound(path.clone()));
            }
            Ok(AudioSource::File(path.clone()))
        }
        JobInput::Inline(encoded) => decode_inline(encoded).map(AudioSource::Samples),
    }
}

/// Decode a base64 audio container into 16 kHz mono samples.
pub fn decode_inline(encoded: &str) -> Result<AudioChunk> {
    let bytes = decode_base64(encoded)?;
    if bytes.is_empty() {
        return Err(ScanscribeError::EmptyPayload);
    }
    let encoded_len = bytes.len();

    // `decode_to_mono` owns and releases the container bytes.
    let (mono, source_rate) = decode::decode_to_mono(bytes)?;
    let samples = resample::convert(&mono, source_rate, MODEL_SAMPLE_RATE)?;
    drop(mono);

    debug!(
        encoded_len,
        source_rate,
        samples = samples.len(),
        "inline audio normalised"
    );

    Ok(AudioChunk::new(samples, MODEL_SAMPLE_RATE))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|_| ScanscribeError::InvalidBase64);
    drop(compact);
    bytes
}
