//! # scanscribe-core
//!
//! Persistent audio-analysis worker for scanner traffic: transcription and
//! dispatch-tone detection over a newline-delimited JSON protocol.
//!
//! ## Architecture
//!
//! ```text
//! stdin ─► protocol::run ─► parse_job ─► Worker::handle
//!                                           │
//!                 ┌─────────────────────────┴──────────────────────┐
//!           transcribe                                       detect_tones
//!   audio::resolve → validate → orchestrator      audio::resolve → validate → ToneDetector
//!                     (VAD pass, then unfiltered retry)
//!                                           │
//!                                   classify (on error)
//!                                           │
//! stdout ◄──────────────────────────── Response line
//! ```
//!
//! One job at a time on one thread. The speech backend and tone detector are
//! built once and owned by the [`Worker`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod ipc;
pub mod process;
pub mod tones;
pub mod validate;

// Convenience re-exports for the worker binary
pub use config::{ComputeDevice, WorkerConfig};
pub use engine::{Worker, WorkerDiagnostics, WorkerSettings};
pub use error::ScanscribeError;
pub use inference::{SpeechBackend, TranscriptSegment, TranscriptionParams};
pub use ipc::events::{DetectedTone, Heartbeat, ReadySignal, Response};
pub use tones::{ToneDetection, ToneDetector, ToneEvent};
pub use validate::{FfprobeProbe, StructuralProbe};
