//! Whole-clip sample-rate conversion on top of rubato's `FastFixedIn`.
//!
//! Inline payloads arrive at whatever rate the parent recorded them (8 kHz
//! scanner feeds, 44.1 kHz uploads). The model wants 16 kHz mono, and the
//! clip is already fully in memory, so conversion runs in one sweep: full
//! blocks first, then a partial block for the tail, then the resampler's
//! delay is cut from the front and the result trimmed to `len * ratio`.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{Result, ScanscribeError};

/// Input frames handed to rubato per call.
pub const BLOCK_FRAMES: usize = 1024;

/// Convert `samples` from `source_rate` to `target_rate`.
///
/// # Errors
/// `ScanscribeError::Decode` if either rate is zero or rubato rejects a block.
pub fn convert(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ScanscribeError::Decode(format!(
            "invalid sample rate conversion {source_rate} Hz -> {target_rate} Hz"
        )));
    }
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, BLOCK_FRAMES, 1)
        .map_err(|e| ScanscribeError::Decode(format!("resampler init: {e}")))?;

    let wanted = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut block_out = vec![vec![0f32; resampler.output_frames_max()]; 1];
    let mut out = Vec::with_capacity(wanted + delay + block_out[0].len());

    let mut rest = samples;
    while rest.len() >= resampler.input_frames_next() {
        let (block, tail) = rest.split_at(resampler.input_frames_next());
        let (_, produced) = resampler
            .process_into_buffer(&[block], &mut block_out, None)
            .map_err(|e| ScanscribeError::Decode(format!("resample: {e}")))?;
        out.extend_from_slice(&block_out[0][..produced]);
        rest = tail;
    }

    // Remainder, then silence until the delayed output has drained.
    let mut pending: Option<&[f32]> = (!rest.is_empty()).then_some(rest);
    while out.len() < wanted + delay {
        let input = pending.take().map(|r| [r]);
        let (_, produced) = resampler
            .process_partial_into_buffer(input.as_ref().map(|b| &b[..]), &mut block_out, None)
            .map_err(|e| ScanscribeError::Decode(format!("resample flush: {e}")))?;
        if produced == 0 {
            break;
        }
        out.extend_from_slice(&block_out[0][..produced]);
    }

    let start = delay.min(out.len());
    let mut converted = out.split_off(start);
    converted.truncate(wanted);
    debug!(source_rate, target_rate, input = samples.len(), output = converted.len(), "clip resampled");
    Ok(converted)
}
