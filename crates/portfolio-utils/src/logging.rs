//! Logging and tracing utilities

use crate::config::{LogConfig, LogFormat};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the configuration from the environment
pub fn init_tracing() {
    init_tracing_with(&LogConfig::from_env());
}

/// Initialize tracing subscriber with an explicit configuration
///
/// `RUST_LOG` still wins over `config.default_filter`. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_tracing_with(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
