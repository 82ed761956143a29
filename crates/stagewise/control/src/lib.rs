//! Stagewise Control Channel
//!
//! The transport-agnostic command/event surface of the workflow engine.
//! Observers send `workflow.*` commands and receive `workflow.progress`
//! notifications; none of their behavior is authoritative.
//!
//! - [`Command`] / [`CommandResponse`]: the wire envelopes
//! - [`dispatch`]: maps a command onto [`WorkflowRegistry`] calls
//! - [`ControlChannel`] / [`ControlClient`]: an in-process channel
//! - [`ControlConfig`]: layered configuration
//! - [`init_tracing`]: tracing subscriber setup
//!
//! [`WorkflowRegistry`]: stagewise_engine::WorkflowRegistry

#![deny(unsafe_code)]

pub mod channel;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod telemetry;

pub use channel::{ControlChannel, ControlClient, EventStream};
pub use commands::{Command, CommandError, CommandResponse, Notification, WorkflowRef, PROGRESS_METHOD};
pub use config::{ChannelConfig, ControlConfig, LoggingConfig};
pub use dispatcher::dispatch;
pub use error::{ControlError, ControlResult};
pub use telemetry::init_tracing;
