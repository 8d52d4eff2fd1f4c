//! Bounded subprocess execution for the external tools the worker leans on
//! (`ffprobe`, `whisper-cli`, `icad-tone-detect`).
//!
//! Pipes are drained on helper threads so a chatty child cannot deadlock on a
//! full pipe while the caller polls for exit. On timeout the child is killed
//! and reaped before returning.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanscribeError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PIPE_GRACE: Duration = Duration::from_millis(100);

pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run `program` to completion and return its output regardless of exit status.
///
/// # Errors
/// - `CommandMissing` if the program is not on PATH.
/// - `CommandTimedOut` if `timeout` elapses first.
/// - `Io` if the process cannot be spawned.
pub fn run_with_timeout(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    if !command_exists(program) {
        return Err(ScanscribeError::CommandMissing {
            command: program.to_owned(),
        });
    }

    let rendered = render(program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());
    let started_at = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: stdout_rx.recv_timeout(PIPE_GRACE).unwrap_or_default(),
                stderr: stderr_rx.recv_timeout(PIPE_GRACE).unwrap_or_default(),
            });
        }

        if started_at.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            let stderr = stderr_rx.recv_timeout(PIPE_GRACE).unwrap_or_default();
            return Err(ScanscribeError::from_command_timeout(
                rendered,
                saturating_duration_ms(timeout),
                &String::from_utf8_lossy(&stderr),
            ));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Like [`run_with_timeout`] but a non-zero exit becomes `CommandFailed`.
pub fn run_checked(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let output = run_with_timeout(program, args, timeout)?;
    if output.status.success() {
        return Ok(output);
    }
    Err(ScanscribeError::from_command_failure(
        render(program, args),
        output.status.code().unwrap_or(-1),
        &String::from_utf8_lossy(&output.stderr),
    ))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

fn render(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn saturating_duration_ms(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
