//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{ServerError, ServerResult};

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise.
pub fn env_filter(settings: &LoggingSettings) -> ServerResult<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env()
            .map_err(|e| ServerError::logging(format!("invalid RUST_LOG: {e}")));
    }
    EnvFilter::try_new(&settings.level)
        .map_err(|e| ServerError::logging(format!("invalid log level: {e}")))
}

/// Installs the global subscriber, JSON or pretty per `settings`.
pub fn init_logging(settings: &LoggingSettings) -> ServerResult<()> {
    let filter = env_filter(settings)?;

    let fmt_layer = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ServerError::logging(e.to_string()))
}
