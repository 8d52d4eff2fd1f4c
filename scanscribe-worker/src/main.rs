//! Scanscribe worker entry point.
//!
//! Started by a parent controller as a long-lived child process. Reads jobs
//! from stdin, writes one JSON line per response to stdout, logs to stderr.
//!
//! Exit codes: 0 when the parent closes stdin, 1 when startup fails before
//! the ready signal or the protocol streams break.

mod logging;

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use scanscribe_core::engine::protocol;
use scanscribe_core::inference::{WhisperCliBackend, WhisperCliConfig};
use scanscribe_core::tones::{IcadToneDetector, ToneDetector};
use scanscribe_core::{FfprobeProbe, Worker, WorkerConfig, WorkerSettings};
use tracing::{error, info};

fn main() -> ExitCode {
    // A missing .env file is normal in production.
    dotenvy::dotenv().ok();
    logging::init();

    info!(version = env!("CARGO_PKG_VERSION"), "scanscribe worker starting");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "worker exiting");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("loading configuration")?;
    let device = config.requested_device.resolve();
    config.log_summary(device);

    let backend = WhisperCliBackend::new(WhisperCliConfig::new(
        &config.model,
        device,
        &config.whisper,
    ));
    let tone_detector = IcadToneDetector::locate(config.tones.bin.clone(), config.tones.timeout)
        .map(|d| Box::new(d) as Box<dyn ToneDetector>);
    let probe = FfprobeProbe::new(config.ffprobe_bin.clone());

    let mut worker = Worker::new(
        Box::new(backend),
        tone_detector,
        Box::new(probe),
        WorkerSettings::from(&config),
    );
    worker.warm_up().context("warming up speech backend")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    protocol::run(
        &mut worker,
        stdin.lock(),
        &mut stdout.lock(),
        config.heartbeat_interval,
    )
    .context("protocol stream failed")?;

    Ok(())
}
