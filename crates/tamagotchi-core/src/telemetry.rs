//! Tracing setup shared by the tamagotchi binaries.
//!
//! [`init_tracing`] installs the global subscriber once: an `EnvFilter`
//! honouring `RUST_LOG`, with plain or JSON line output. Later calls are
//! no-ops because a process can only have one global subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` selects newline-delimited JSON output for log shipping.
/// * `level` is the verbosity used when `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Logs go to stderr so `--json` command output on stdout stays parseable.
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
