//! Tracing initialisation

use crate::config::LoggingConfig;
use crate::error::{ControlError, ControlResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> ControlResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ControlError::Telemetry(format!("invalid log level '{}': {e}", config.level)))?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    installed.map_err(|e| ControlError::Telemetry(e.to_string()))
}
