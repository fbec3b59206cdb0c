//! Structured logging.
//!
//! JSON lines in production, human-readable output otherwise. `RUST_LOG`
//! overrides the configured filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

fn filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if one is already set.
pub fn try_init_logging(config: &ObservabilityConfig) -> Result<(), String> {
    let registry = tracing_subscriber::registry().with(filter(config));
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| e.to_string())
}

/// Install the global subscriber, keeping an existing one.
pub fn init_logging(config: &ObservabilityConfig) {
    if let Err(e) = try_init_logging(config) {
        eprintln!("logging already initialized: {}", e);
    }
}
