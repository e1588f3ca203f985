//! Logging initialization.

use crate::config::LoggingConfig;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: OnceLock<()> = OnceLock::new();

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Safe to call more than
/// once; only the first call installs anything.
pub fn init(config: &LoggingConfig) {
    let format = config.format.clone();
    let filter = config.filter.clone();

    INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if format == "json" {
            registry
                .with(fmt::layer().json().with_target(true))
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(true)).try_init()
        };

        if let Err(err) = result {
            // A subscriber installed by a test harness or embedding
            // application is left in place.
            tracing::debug!("subscriber already set: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init(&config);
        init(&config);
    }
}
