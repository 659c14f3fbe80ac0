//! Log subscriber setup for the binary.
//!
//! The library only emits `tracing` events. `RUST_LOG` wins over the
//! configured level when it is set and parses.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter from `RUST_LOG`, else from `level` (e.g. `"info"`, `"iiif_raster=debug"`).
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber, writing compact lines to stderr so stdout
/// stays clean for `info --json`. Fails if a subscriber is already set.
pub fn init(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
}
