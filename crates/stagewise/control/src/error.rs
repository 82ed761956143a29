//! Error types for the control channel

use stagewise_types::WorkflowError;
use thiserror::Error;

/// Control channel error type
#[derive(Debug, Error)]
pub enum ControlError {
    /// The engine rejected an operation issued in-process
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The engine rejected a command sent over the channel
    #[error("Command rejected ({kind}): {message}")]
    Rejected { kind: String, message: String },

    /// The serving side of the channel is gone
    #[error("Control channel closed")]
    ChannelClosed,

    /// A command or response payload could not be decoded
    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Result type for control operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;

impl ControlError {
    /// Stable machine-readable kind, matching the engine's kinds where
    /// the error originated there
    pub fn kind(&self) -> &str {
        match self {
            Self::Workflow(e) => e.kind(),
            Self::Rejected { kind, .. } => kind,
            Self::ChannelClosed => "channel_closed",
            Self::Payload(_) => "invalid_command",
            Self::Config(_) => "config_error",
            Self::Telemetry(_) => "telemetry_error",
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}
