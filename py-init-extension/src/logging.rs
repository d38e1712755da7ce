//! Logging setup for the addon.

use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Filter for the addon's subscriber: `RUST_LOG` when set, else the
/// configured level.
pub fn log_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install a fmt subscriber at the configured level.
///
/// Hosts that already installed a subscriber keep theirs. Returns whether
/// this call installed one.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let installed = FmtSubscriber::builder()
        .with_env_filter(log_filter(config))
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialized at {}", config.level);
    }
    installed
}
