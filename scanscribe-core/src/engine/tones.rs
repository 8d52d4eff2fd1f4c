//! `detect_tones` dispatch: one detector call, flattened into a response.

use tracing::info;

use crate::audio;
use crate::error::{Result, ScanscribeError};
use crate::ipc::events::Response;
use crate::ipc::job::JobInput;
use crate::tones::{ToneDetectionParams, ToneDetector};
use crate::validate::{self, StructuralProbe, ValidatorConfig};

pub struct ToneJob<'a> {
    pub id: &'a str,
    pub input: &'a JobInput,
    pub params: &'a ToneDetectionParams,
    pub validator: &'a ValidatorConfig,
    pub probe: &'a dyn StructuralProbe,
}

pub fn detect(detector: Option<&mut (dyn ToneDetector + 'static)>, job: ToneJob<'_>) -> Result<Response> {
    let detector = detector.ok_or(ScanscribeError::ToneDetectionUnavailable)?;
    let JobInput::Path(path) = job.input else {
        return Err(ScanscribeError::UnsupportedInput);
    };

    let source = audio::resolve(job.input)?;
    if let Some(path) = source.path() {
        validate::validate(path, job.validator, job.probe)?;
    }

    let detection = detector.detect(path, job.params)?;
    let detected_tones = detection.primary_tones();
    info!(
        any = detection.any(),
        primary = ?detection.primary(),
        tones = detected_tones.len(),
        "tones classified"
    );

    Ok(Response::Tones {
        id: job.id.to_owned(),
        has_two_tone: detection.any(),
        detected_tones,
        file_path: path.display().to_string(),
    })
}
