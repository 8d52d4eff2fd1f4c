//! `icad-tone-detect` CLI adapter.
//!
//! The tool prints one JSON object with `two_tone`, `pulsed` and `long_tone`
//! arrays. Item shapes vary between tool releases, so the parser accepts the
//! field spellings seen in the wild (`tone_a`/`tone_b` or a `detected` pair,
//! `duration` or `length`).

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use super::{ToneDetection, ToneDetectionParams, ToneDetector, ToneEvent};
use crate::error::{Result, ScanscribeError};
use crate::process;

pub const DEFAULT_BIN: &str = "icad-tone-detect";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IcadToneDetector {
    program: String,
    timeout: Duration,
}

impl IcadToneDetector {
    /// `None` when `program` is not on PATH.
    pub fn locate(program: impl Into<String>, timeout: Duration) -> Option<Self> {
        let program = program.into();
        if !process::command_exists(&program) {
            return None;
        }
        Some(Self { program, timeout })
    }
}

impl ToneDetector for IcadToneDetector {
    fn detect(&mut self, path: &Path, params: &ToneDetectionParams) -> Result<ToneDetection> {
        let args = build_args(path, params);
        debug!(program = %self.program, ?args, "running tone detector");

        let output = process::run_checked(&self.program, &args, self.timeout)
            .map_err(|e| ScanscribeError::ToneDetection(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let detection = parse_output(&stdout)?;
        info!(
            path = %path.display(),
            events = detection.events.len(),
            primary = ?detection.primary(),
            "tone detection finished"
        );
        Ok(detection)
    }
}

pub(crate) fn build_args(path: &Path, p: &ToneDetectionParams) -> Vec<String> {
    let flag = |b: bool| b.to_string();
    let mut args = vec![
        path.display().to_string(),
        "--detect_two_tone".to_owned(),
        flag(p.detect_two_tone),
        "--detect_pulsed".to_owned(),
        flag(p.detect_pulsed),
        "--detect_long".to_owned(),
        flag(p.detect_long),
        "--detect_hi_low".to_owned(),
        flag(false),
        "--detect_mdc".to_owned(),
        flag(false),
        "--detect_dtmf".to_owned(),
        flag(false),
        "--time_resolution_ms".to_owned(),
        p.time_resolution_ms.to_string(),
        "--matching_threshold".to_owned(),
        p.matching_threshold.to_string(),
        "--fe_freq_band".to_owned(),
        p.frequency_band.clone(),
        "--fe_force_split_step_hz".to_owned(),
        p.force_split_step_hz.to_string(),
        "--fe_abs_cap_hz".to_owned(),
        p.abs_cap_hz.to_string(),
    ];

    if p.detect_two_tone {
        args.extend([
            "--tone_a_min_length".to_owned(),
            p.tone_a_min_length.to_string(),
            "--tone_b_min_length".to_owned(),
            p.tone_b_min_length.to_string(),
            "--two_tone_bw_hz".to_owned(),
            p.two_tone_bw_hz.to_string(),
            "--two_tone_min_pair_separation_hz".to_owned(),
            p.two_tone_min_pair_separation_hz.to_string(),
        ]);
    }

    if p.detect_pulsed {
        args.extend([
            "--pulsed_min_cycles".to_owned(),
            p.pulsed_min_cycles.to_string(),
            "--pulsed_min_on_ms".to_owned(),
            p.pulsed_min_on_ms.to_string(),
            "--pulsed_max_on_ms".to_owned(),
            p.pulsed_max_on_ms.to_string(),
            "--pulsed_min_off_ms".to_owned(),
            p.pulsed_min_off_ms.to_string(),
            "--pulsed_max_off_ms".to_owned(),
            p.pulsed_max_off_ms.to_string(),
            "--pulsed_bw_hz".to_owned(),
            p.pulsed_bw_hz.to_string(),
        ]);
    }

    if p.detect_long {
        args.extend([
            "--long_tone_min_length".to_owned(),
            p.long_tone_min_length.to_string(),
            "--long_tone_bw_hz".to_owned(),
            p.long_tone_bw_hz.to_string(),
        ]);
    }

    args
}

pub(crate) fn parse_output(stdout: &str) -> Result<ToneDetection> {
    let root: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
        ScanscribeError::ToneDetection(format!("unreadable detector output: {e}"))
    })?;
    if !root.is_object() {
        return Err(ScanscribeError::ToneDetection(
            "detector output is not a JSON object".into(),
        ));
    }

    let mut events = Vec::new();
    events.extend(items(&root, "two_tone").filter_map(two_tone_event));
    events.extend(items(&root, "pulsed").filter_map(pulsed_event));
    events.extend(items(&root, "long_tone").filter_map(long_tone_event));
    Ok(ToneDetection { events })
}

fn items<'a>(root: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    root.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn num(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| item.get(*k).and_then(Value::as_f64))
}

fn two_tone_event(item: &Value) -> Option<ToneEvent> {
    let pair = item.get("detected").and_then(Value::as_array);
    let tone_a = num(item, &["tone_a"]).or_else(|| pair?.first()?.as_f64())?;
    let tone_b = num(item, &["tone_b"]).or_else(|| pair?.get(1)?.as_f64())?;
    Some(ToneEvent::TwoTone {
        tone_a,
        tone_b,
        duration_a: num(item, &["duration_a", "tone_a_length"]),
        duration_b: num(item, &["duration_b", "tone_b_length"]),
    })
}

fn pulsed_event(item: &Value) -> Option<ToneEvent> {
    Some(ToneEvent::Pulsed {
        frequency: num(item, &["frequency", "detected"])?,
        cycles: item
            .get("cycles")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok()),
    })
}

fn long_tone_event(item: &Value) -> Option<ToneEvent> {
    Some(ToneEvent::LongTone {
        frequency: num(item, &["frequency", "detected"])?,
        duration: num(item, &["duration", "length"]),
    })
}
