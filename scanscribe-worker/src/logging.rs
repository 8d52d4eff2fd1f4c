//! Tracing subscriber setup.
//!
//! stdout belongs to the protocol, so every log line goes to stderr.
//! `RUST_LOG` overrides the default filter; `RUST_LOG_FORMAT=json` switches
//! to one JSON object per event.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "scanscribe_core=info,scanscribe_worker=info";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false);

    if json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
