//! Tracing setup for the questline binaries.
//!
//! [`init_tracing`] installs the global subscriber; the global can only be
//! set once per process, so later calls are silently ignored. Filtering
//! reads `QUESTLINE_LOG` first, then `RUST_LOG`, then falls back to the
//! requested level scoped to the questline crates so dependency chatter
//! (hyper, reqwest) stays out of sync-cycle logs.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "QUESTLINE_LOG";

fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!(
        "warn,questline={level},questline_core={level},questline_canvas={level}"
    ))
}

fn resolve_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_filter(level))
}

/// Install the global tracing subscriber.
///
/// * `json` — newline-delimited JSON log lines instead of human output.
/// * `level` — verbosity for the questline crates when neither
///   `QUESTLINE_LOG` nor `RUST_LOG` is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = resolve_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
