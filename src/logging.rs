use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter. `format = "json"` emits
/// one JSON object per event for log aggregation; anything else gets the
/// human-readable formatter. Calling this twice is harmless (the second
/// call is ignored), which keeps tests that share a process happy.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing already initialized");
    }
}
