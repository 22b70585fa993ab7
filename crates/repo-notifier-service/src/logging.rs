//! Tracing subscriber setup.

use repo_notifier_api::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

/// Crates whose events are shown at the configured level
const LOGGED_CRATES: &[&str] = &[
    "repo_notifier_service",
    "repo_notifier_api",
    "repo_notifier_core",
    "queue_runtime",
    "tower_http",
];

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    LOGGED_CRATES
        .iter()
        .map(|name| format!("{}={}", name, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level. A second call is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
