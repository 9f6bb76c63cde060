//! Logging setup for the `sqlite-clean` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to the binary.

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "sqlite_clean=warn";
const VERBOSE_LOG_FILTER: &str = "sqlite_clean=debug";

pub struct LogConfig {
    pub verbose: bool,
}

/// Install a stderr subscriber.  `RUST_LOG` wins over the defaults when set.
/// Stdout is left alone so command output stays clean.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}
