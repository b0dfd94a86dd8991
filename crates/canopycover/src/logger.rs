//! Logging setup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when neither `--log-level` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber, logging to stderr.
///
/// `level` takes precedence over `RUST_LOG`; both accept full
/// `EnvFilter` directives such as `canopy_pipeline=debug`.
pub fn init(level: Option<&str>) {
    let env_filter = level.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        EnvFilter::new,
    );

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
