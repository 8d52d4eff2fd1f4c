//! `Worker`: the process-wide service object behind the protocol loop.
//!
//! ## Lifecycle
//!
//! ```text
//! Worker::new(collaborators, settings)
//!     └─► warm_up()             → backend loaded (fatal on error, before ready)
//!         └─► protocol::run()   → ready, then handle() per job until stdin closes
//! ```
//!
//! `handle()` never fails: every stage error is classified into an error
//! response carrying the job id.

pub mod orchestrator;
pub mod protocol;
pub mod tones;

use tracing::{info, info_span, warn};

use crate::audio;
use crate::classify::classify;
use crate::config::{TranscriptionConfig, WorkerConfig};
use crate::error::{Result, ScanscribeError};
use crate::inference::SpeechBackend;
use crate::ipc::events::Response;
use crate::ipc::job::{Command, Job};
use crate::tones::{ToneDetectionParams, ToneDetector};
use crate::validate::{self, StructuralProbe, ValidatorConfig};

/// Job-invariant settings the worker applies to every job.
#[derive(Debug, Clone, Default)]
pub struct WorkerSettings {
    pub transcription: TranscriptionConfig,
    pub validator: ValidatorConfig,
    pub tone_params: ToneDetectionParams,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(cfg: &WorkerConfig) -> Self {
        Self {
            transcription: cfg.transcription.clone(),
            validator: cfg.validator.clone(),
            tone_params: cfg.tones.params.clone(),
        }
    }
}

/// Counters for the lifetime of the loop. Logged once at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerDiagnostics {
    pub lines_read: usize,
    pub lines_dropped: usize,
    pub jobs_handled: usize,
    pub transcriptions: usize,
    pub second_passes: usize,
    pub tone_jobs: usize,
    pub error_responses: usize,
    pub panics_caught: usize,
    pub heartbeats: usize,
}

impl WorkerDiagnostics {
    pub fn log(&self) {
        info!(
            lines_read = self.lines_read,
            lines_dropped = self.lines_dropped,
            jobs_handled = self.jobs_handled,
            transcriptions = self.transcriptions,
            second_passes = self.second_passes,
            tone_jobs = self.tone_jobs,
            error_responses = self.error_responses,
            panics_caught = self.panics_caught,
            heartbeats = self.heartbeats,
            "worker stopped, diagnostics"
        );
    }
}

pub struct Worker {
    backend: Box<dyn SpeechBackend>,
    tone_detector: Option<Box<dyn ToneDetector>>,
    probe: Box<dyn StructuralProbe>,
    settings: WorkerSettings,
    diagnostics: WorkerDiagnostics,
}

impl Worker {
    pub fn new(
        backend: Box<dyn SpeechBackend>,
        tone_detector: Option<Box<dyn ToneDetector>>,
        probe: Box<dyn StructuralProbe>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            backend,
            tone_detector,
            probe,
            settings,
            diagnostics: WorkerDiagnostics::default(),
        }
    }

    /// Load the speech backend. Call once, before the loop starts.
    pub fn warm_up(&mut self) -> Result<()> {
        info!("warming up speech backend");
        self.backend.warm_up()?;
        if self.tone_detector.is_none() {
            warn!("tone detector not installed, detect_tones jobs will be refused");
        }
        info!("speech backend ready");
        Ok(())
    }

    pub fn diagnostics(&self) -> WorkerDiagnostics {
        self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut WorkerDiagnostics {
        &mut self.diagnostics
    }

    /// Serve one job. Always returns exactly one response for `job.id`.
    pub fn handle(&mut self, job: &Job) -> Response {
        let span = info_span!(
            "job",
            job_id = %job.id,
            command = job.command.as_str(),
            input = job.input.kind()
        );
        let _enter = span.enter();
        self.diagnostics.jobs_handled += 1;

        let result = match job.command {
            Command::Transcribe => self.transcribe(job),
            Command::DetectTones => self.detect_tones(job),
        };

        match result {
            Ok(response) => response,
            Err(err) => self.reject(&job.id, &err),
        }
    }

    /// Classify `err` into the error response for `id`.
    pub fn reject(&mut self, id: &str, err: &ScanscribeError) -> Response {
        let classified = classify(err, id);
        warn!(
            job_id = %id,
            kind = classified.kind.as_str(),
            error = %err,
            "job failed"
        );
        self.diagnostics.error_responses += 1;
        Response::error(id, classified.message)
    }

    fn transcribe(&mut self, job: &Job) -> Result<Response> {
        self.diagnostics.transcriptions += 1;

        let source = audio::resolve(&job.input)?;
        if let Some(path) = source.path() {
            validate::validate(path, &self.settings.validator, self.probe.as_ref())?;
        }

        let outcome = orchestrator::transcribe(
            self.backend.as_mut(),
            &source,
            &self.settings.transcription,
        );
        // Decoded buffers are job-scoped; release before building the reply.
        drop(source);
        let outcome = outcome?;

        if outcome.passes > 1 {
            self.diagnostics.second_passes += 1;
        }
        info!(chars = outcome.text.len(), passes = outcome.passes, "transcription complete");

        Ok(Response::Transcription {
            id: job.id.clone(),
            transcription: outcome.text,
        })
    }

    fn detect_tones(&mut self, job: &Job) -> Result<Response> {
        self.diagnostics.tone_jobs += 1;
        tones::detect(
            self.tone_detector.as_deref_mut(),
            tones::ToneJob {
                id: &job.id,
                input: &job.input,
                params: &self.settings.tone_params,
                validator: &self.settings.validator,
                probe: self.probe.as_ref(),
            },
        )
    }
}
