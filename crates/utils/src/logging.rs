//! provides logging helpers

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// Defaults to INFO; `RUST_LOG` overrides per target.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    registry()
        .with(
            layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter),
        )
        .init();
}
