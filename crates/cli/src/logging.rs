//! Diagnostics output.
//!
//! Everything the logger reports (chip identification, header summaries,
//! validation mismatches) goes through `tracing`. This installs the one
//! subscriber: compact human-readable lines on stderr.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` overrides the default level; `verbose` lowers the default from
/// `info` to `debug`, which adds per-record dumps.
pub fn init(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
