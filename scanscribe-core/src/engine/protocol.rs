//! The stdin/stdout request loop.
//!
//! ```text
//! emit {"ready":true}
//! loop:
//!     read line ──EOF──► return diagnostics
//!     heartbeat if idle ≥ interval
//!     blank? → skip
//!     parse ──unparsable / no id──► log, drop
//!           ──rejected──► error response
//!     worker.handle(job) (panics caught here) → response
//! ```
//!
//! Each iteration starts with a fresh [`Iteration`] whose job id is `None`
//! until a line parses, so a caught panic can still be answered when the
//! id is known.

use std::any::Any;
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{Worker, WorkerDiagnostics};
use crate::classify::unexpected_message;
use crate::error::Result;
use crate::ipc::events::{write_line, Heartbeat, ReadySignal, Response};
use crate::ipc::job::{parse_job, JobParseError};

/// Tracks idle time between heartbeats.
#[derive(Debug, Clone)]
pub struct HeartbeatTimer {
    interval: Duration,
    last: Instant,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }
}

/// Per-line state.
#[derive(Debug, Default)]
struct Iteration {
    job_id: Option<String>,
}

/// Run the loop until `input` reaches EOF.
///
/// # Errors
/// Only I/O failures on `input` or `output`; job failures become responses.
pub fn run<R: BufRead, W: Write>(
    worker: &mut Worker,
    mut input: R,
    output: &mut W,
    heartbeat_interval: Duration,
) -> Result<WorkerDiagnostics> {
    write_line(output, &ReadySignal::default())?;
    info!("ready, waiting for jobs");

    let mut heartbeat = HeartbeatTimer::new(heartbeat_interval);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            info!("stdin closed, shutting down");
            break;
        }
        worker.diagnostics_mut().lines_read += 1;

        if heartbeat.due(Instant::now()) {
            write_line(output, &Heartbeat::now())?;
            worker.diagnostics_mut().heartbeats += 1;
            heartbeat.reset(Instant::now());
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut iteration = Iteration::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            serve_line(worker, line, &mut iteration)
        }));

        let response = match outcome {
            Ok(response) => response,
            Err(payload) => {
                worker.diagnostics_mut().panics_caught += 1;
                let detail = panic_message(payload.as_ref());
                error!(job_id = ?iteration.job_id, %detail, "unexpected failure while serving job");
                iteration.job_id.map(|id| {
                    worker.diagnostics_mut().error_responses += 1;
                    Response::error(id, unexpected_message(&detail))
                })
            }
        };

        if let Some(response) = response {
            write_line(output, &response)?;
            heartbeat.reset(Instant::now());
        }
    }

    let diagnostics = worker.diagnostics();
    diagnostics.log();
    Ok(diagnostics)
}

fn serve_line(worker: &mut Worker, line: &str, iteration: &mut Iteration) -> Option<Response> {
    match parse_job(line) {
        Ok(job) => {
            iteration.job_id = Some(job.id.clone());
            debug!(job_id = %job.id, command = job.command.as_str(), "job received");
            Some(worker.handle(&job))
        }
        Err(JobParseError::Unparsable(reason)) => {
            worker.diagnostics_mut().lines_dropped += 1;
            warn!(%reason, line = %truncate(line, 200), "dropping unparsable line");
            None
        }
        Err(JobParseError::MissingId) => {
            worker.diagnostics_mut().lines_dropped += 1;
            warn!(line = %truncate(line, 200), "dropping job without id");
            None
        }
        Err(JobParseError::Rejected { id, error }) => {
            iteration.job_id = Some(id.clone());
            Some(worker.reject(&id, &error))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_owned()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_due_after_interval() {
        let t0 = Instant::now();
        let timer = HeartbeatTimer::starting_at(Duration::from_secs(300), t0);
        assert!(!timer.due(t0 + Duration::from_secs(299)));
        assert!(timer.due(t0 + Duration::from_secs(300)));
    }

    #[test]
    fn reset_restarts_the_idle_window() {
        let t0 = Instant::now();
        let mut timer = HeartbeatTimer::starting_at(Duration::from_secs(300), t0);
        timer.reset(t0 + Duration::from_secs(200));
        assert!(!timer.due(t0 + Duration::from_secs(400)));
        assert!(timer.due(t0 + Duration::from_secs(500)));
    }

    #[test]
    fn panic_payloads_render() {
        let s: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(s.as_ref()), "static str");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "panic");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
