//! Shared logging utilities for Gatescan binaries.
//!
//! Both daemons run containerized, so everything goes to stderr and log
//! shipping is the platform's problem. `RUST_LOG` overrides the default
//! filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "gatescan_producer=info,gatescan_worker=info,gatescan_state=info,gatescan_protocol=info";

/// Logging configuration shared by Gatescan binaries.
pub struct LogConfig {
    pub verbose: bool,
}

/// Initialize tracing with an env-filtered stderr layer.
pub fn init_logging(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}
