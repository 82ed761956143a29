//! Configuration for the control layer

use crate::error::ControlResult;
use serde::{Deserialize, Serialize};
use stagewise_engine::EngineConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Command channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Command channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Commands queued before senders wait
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_command_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ControlConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `STAGEWISE_*` environment variables (`__` separates nesting, e.g.
    /// `STAGEWISE_ENGINE__MAX_ACTIVE_WORKFLOWS=8`).
    pub fn load(path: Option<&str>) -> ControlResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("STAGEWISE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
