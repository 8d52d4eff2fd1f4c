//! Dispatch-tone detection: parameters, results, and the detector seam.
//!
//! ## Parameter merge
//!
//! ```text
//! ToneDetectionParams::default()   library defaults (auto profile)
//!        ▲ apply(profile(mode))    TONE_DETECTION_TYPE
//!        ▲ apply(overrides)        explicit per-parameter overrides
//! ```
//!
//! Later layers only replace the fields they set.

pub mod icad;

pub use icad::IcadToneDetector;

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::ipc::events::DetectedTone;

/// Which tone families a detector run looks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    #[default]
    Auto,
    TwoTone,
    Pulsed,
    Long,
    Both,
}

impl DetectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Auto => "auto",
            DetectionMode::TwoTone => "two_tone",
            DetectionMode::Pulsed => "pulsed",
            DetectionMode::Long => "long",
            DetectionMode::Both => "both",
        }
    }
}

/// Map a `TONE_DETECTION_TYPE` value to a mode.
///
/// Unset or blank means auto. Anything unrecognised selects the traditional
/// two-tone profile.
pub fn normalize_detection_mode(raw: Option<&str>) -> DetectionMode {
    let Some(raw) = raw else {
        return DetectionMode::Auto;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "auto" => DetectionMode::Auto,
        "long" | "long_tone" | "long-tone" => DetectionMode::Long,
        "pulsed" => DetectionMode::Pulsed,
        "both" | "all" => DetectionMode::Both,
        "two_tone" | "two-tone" | "twotone" | "2tone" => DetectionMode::TwoTone,
        other => {
            warn!(value = other, "unknown TONE_DETECTION_TYPE, using two_tone profile");
            DetectionMode::TwoTone
        }
    }
}

/// Fully resolved detector parameters. Built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneDetectionParams {
    pub detect_two_tone: bool,
    pub detect_pulsed: bool,
    pub detect_long: bool,
    pub matching_threshold: f64,
    pub time_resolution_ms: u32,
    /// `"low,high"` in Hz.
    pub frequency_band: String,
    pub force_split_step_hz: u32,
    pub abs_cap_hz: u32,
    pub tone_a_min_length: f64,
    pub tone_b_min_length: f64,
    pub two_tone_bw_hz: u32,
    pub two_tone_min_pair_separation_hz: u32,
    pub pulsed_min_cycles: u32,
    pub pulsed_min_on_ms: u32,
    pub pulsed_max_on_ms: u32,
    pub pulsed_min_off_ms: u32,
    pub pulsed_max_off_ms: u32,
    pub pulsed_bw_hz: u32,
    pub long_tone_min_length: f64,
    pub long_tone_bw_hz: u32,
}

impl Default for ToneDetectionParams {
    fn default() -> Self {
        Self {
            detect_two_tone: true,
            detect_pulsed: true,
            detect_long: true,
            matching_threshold: 2.5,
            time_resolution_ms: 50,
            frequency_band: "200,3000".into(),
            force_split_step_hz: 18,
            abs_cap_hz: 30,
            tone_a_min_length: 0.85,
            tone_b_min_length: 2.6,
            two_tone_bw_hz: 25,
            two_tone_min_pair_separation_hz: 40,
            pulsed_min_cycles: 6,
            pulsed_min_on_ms: 120,
            pulsed_max_on_ms: 900,
            pulsed_min_off_ms: 25,
            pulsed_max_off_ms: 350,
            pulsed_bw_hz: 25,
            // Catches short dispatch tones just under one second.
            long_tone_min_length: 0.5,
            long_tone_bw_hz: 25,
        }
    }
}

impl ToneDetectionParams {
    /// Defaults, then the mode profile, then explicit overrides.
    pub fn merged(mode: DetectionMode, overrides: &ToneOverrides) -> Self {
        let mut params = Self::default();
        params.apply(&ToneOverrides::profile(mode));
        params.apply(overrides);
        params
    }

    pub fn apply(&mut self, o: &ToneOverrides) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = &o.$field { self.$field = v.clone(); } )*
            };
        }
        take!(
            detect_two_tone,
            detect_pulsed,
            detect_long,
            matching_threshold,
            time_resolution_ms,
            frequency_band,
            force_split_step_hz,
            abs_cap_hz,
            tone_a_min_length,
            tone_b_min_length,
            two_tone_bw_hz,
            two_tone_min_pair_separation_hz,
            pulsed_min_cycles,
            pulsed_min_on_ms,
            pulsed_max_on_ms,
            pulsed_min_off_ms,
            pulsed_max_off_ms,
            pulsed_bw_hz,
            long_tone_min_length,
            long_tone_bw_hz,
        );
    }
}

/// A partial parameter set. `None` leaves the underlying value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToneOverrides {
    pub detect_two_tone: Option<bool>,
    pub detect_pulsed: Option<bool>,
    pub detect_long: Option<bool>,
    pub matching_threshold: Option<f64>,
    pub time_resolution_ms: Option<u32>,
    pub frequency_band: Option<String>,
    pub force_split_step_hz: Option<u32>,
    pub abs_cap_hz: Option<u32>,
    pub tone_a_min_length: Option<f64>,
    pub tone_b_min_length: Option<f64>,
    pub two_tone_bw_hz: Option<u32>,
    pub two_tone_min_pair_separation_hz: Option<u32>,
    pub pulsed_min_cycles: Option<u32>,
    pub pulsed_min_on_ms: Option<u32>,
    pub pulsed_max_on_ms: Option<u32>,
    pub pulsed_min_off_ms: Option<u32>,
    pub pulsed_max_off_ms: Option<u32>,
    pub pulsed_bw_hz: Option<u32>,
    pub long_tone_min_length: Option<f64>,
    pub long_tone_bw_hz: Option<u32>,
}

impl ToneOverrides {
    /// Preset for a detection mode. Auto is the bare defaults.
    pub fn profile(mode: DetectionMode) -> Self {
        // Shared by every non-auto profile.
        let tuned = Self {
            time_resolution_ms: Some(25),
            matching_threshold: Some(2.0),
            frequency_band: Some("200,3000".into()),
            force_split_step_hz: Some(10),
            abs_cap_hz: Some(2000),
            ..Self::default()
        };
        let two_tone = |base: Self| Self {
            tone_a_min_length: Some(0.85),
            tone_b_min_length: Some(2.6),
            two_tone_bw_hz: Some(25),
            two_tone_min_pair_separation_hz: Some(40),
            ..base
        };
        let pulsed = |base: Self| Self {
            pulsed_min_cycles: Some(3),
            pulsed_min_on_ms: Some(50),
            pulsed_max_on_ms: Some(500),
            pulsed_min_off_ms: Some(25),
            pulsed_max_off_ms: Some(800),
            pulsed_bw_hz: Some(50),
            ..base
        };
        let long = |base: Self| Self {
            long_tone_min_length: Some(0.5),
            long_tone_bw_hz: Some(30),
            ..base
        };
        let enable = |two: bool, pul: bool, lng: bool, base: Self| Self {
            detect_two_tone: Some(two),
            detect_pulsed: Some(pul),
            detect_long: Some(lng),
            ..base
        };

        match mode {
            DetectionMode::Auto => Self::default(),
            DetectionMode::Long => enable(false, false, true, long(tuned)),
            DetectionMode::Pulsed => enable(false, true, false, pulsed(tuned)),
            DetectionMode::Both => enable(true, true, true, long(pulsed(two_tone(tuned)))),
            DetectionMode::TwoTone => enable(
                true,
                false,
                false,
                two_tone(Self {
                    time_resolution_ms: Some(50),
                    matching_threshold: Some(2.5),
                    ..tuned
                }),
            ),
        }
    }

    /// Read per-parameter overrides through `lookup` (normally the process
    /// environment). Unparseable values are logged and skipped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| -> Option<(String, String)> {
            names.iter().find_map(|name| {
                lookup(name)
                    .map(|v| v.trim().to_owned())
                    .filter(|v| !v.is_empty())
                    .map(|v| ((*name).to_owned(), v))
            })
        };
        fn parsed<T: std::str::FromStr>(hit: Option<(String, String)>) -> Option<T> {
            let (name, raw) = hit?;
            match raw.parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(variable = %name, value = %raw, "invalid tone override ignored");
                    None
                }
            }
        }

        Self {
            matching_threshold: parsed(first(&[
                "TONE_DETECTION_THRESHOLD",
                "TWO_TONE_DETECTION_THRESHOLD",
            ]))
            .filter(|v: &f64| v.is_finite()),
            time_resolution_ms: parsed(first(&[
                "TONE_TIME_RESOLUTION_MS",
                "TWO_TONE_TIME_RESOLUTION_MS",
            ])),
            frequency_band: first(&["TONE_FREQUENCY_BAND", "TWO_TONE_FREQUENCY_BAND"])
                .and_then(|(name, raw)| normalize_frequency_band(&name, &raw)),
            tone_a_min_length: parsed(first(&["TWO_TONE_MIN_TONE_LENGTH"])),
            tone_b_min_length: parsed(first(&["TWO_TONE_MAX_TONE_LENGTH"])),
            two_tone_min_pair_separation_hz: parsed(first(&["TWO_TONE_MIN_PAIR_SEPARATION_HZ"])),
            two_tone_bw_hz: parsed(first(&["TWO_TONE_BW_HZ", "TWO_TONE_BANDWIDTH_HZ"])),
            pulsed_min_cycles: parsed(first(&["PULSED_MIN_CYCLES"])),
            pulsed_min_on_ms: parsed(first(&["PULSED_MIN_ON_MS"])),
            pulsed_max_on_ms: parsed(first(&["PULSED_MAX_ON_MS"])),
            pulsed_min_off_ms: parsed(first(&["PULSED_MIN_OFF_MS"])),
            pulsed_max_off_ms: parsed(first(&["PULSED_MAX_OFF_MS"])),
            pulsed_bw_hz: parsed(first(&["PULSED_BANDWIDTH_HZ"])),
            long_tone_min_length: parsed(first(&["LONG_TONE_MIN_LENGTH"])),
            long_tone_bw_hz: parsed(first(&["LONG_TONE_BANDWIDTH_HZ"])),
            ..Self::default()
        }
    }
}

/// `"300, 3000"` → `"300,3000"`. Rejects anything that is not two ascending
/// integers.
fn normalize_frequency_band(name: &str, raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let bounds = match parts.as_slice() {
        [lo, hi] => lo.parse::<u32>().ok().zip(hi.parse::<u32>().ok()),
        _ => None,
    };
    match bounds {
        Some((lo, hi)) if lo < hi => Some(format!("{lo},{hi}")),
        _ => {
            warn!(variable = %name, value = %raw, "invalid frequency band ignored");
            None
        }
    }
}

/// One detected tone event, tagged by family.
#[derive(Debug, Clone, PartialEq)]
pub enum ToneEvent {
    TwoTone {
        tone_a: f64,
        tone_b: f64,
        duration_a: Option<f64>,
        duration_b: Option<f64>,
    },
    Pulsed {
        frequency: f64,
        cycles: Option<u32>,
    },
    LongTone {
        frequency: f64,
        duration: Option<f64>,
    },
}

/// Tone family, in reporting precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToneCategory {
    TwoTone,
    Pulsed,
    LongTone,
}

impl ToneEvent {
    pub fn category(&self) -> ToneCategory {
        match self {
            ToneEvent::TwoTone { .. } => ToneCategory::TwoTone,
            ToneEvent::Pulsed { .. } => ToneCategory::Pulsed,
            ToneEvent::LongTone { .. } => ToneCategory::LongTone,
        }
    }

    pub fn to_detected(&self) -> DetectedTone {
        match *self {
            ToneEvent::TwoTone {
                tone_a,
                tone_b,
                duration_a,
                duration_b,
            } => DetectedTone {
                tone_a: Some(tone_a),
                tone_b: Some(tone_b),
                duration_a,
                duration_b,
                ..Default::default()
            },
            ToneEvent::Pulsed { frequency, cycles } => DetectedTone {
                frequency: Some(frequency),
                cycles,
                ..Default::default()
            },
            ToneEvent::LongTone {
                frequency,
                duration,
            } => DetectedTone {
                frequency: Some(frequency),
                duration,
                ..Default::default()
            },
        }
    }
}

/// Everything one detector run found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToneDetection {
    pub events: Vec<ToneEvent>,
}

impl ToneDetection {
    pub fn any(&self) -> bool {
        !self.events.is_empty()
    }

    /// The highest-precedence family that fired.
    pub fn primary(&self) -> Option<ToneCategory> {
        self.events.iter().map(ToneEvent::category).min()
    }

    /// Events of the primary family, in detector order.
    pub fn primary_tones(&self) -> Vec<DetectedTone> {
        let Some(primary) = self.primary() else {
            return Vec::new();
        };
        self.events
            .iter()
            .filter(|e| e.category() == primary)
            .map(ToneEvent::to_detected)
            .collect()
    }
}

/// Contract for tone detectors.
pub trait ToneDetector: Send {
    /// Analyse the file at `path`. One call per job, never retried.
    fn detect(&mut self, path: &Path, params: &ToneDetectionParams) -> Result<ToneDetection>;
}
