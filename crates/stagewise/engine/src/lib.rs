//! Stagewise Workflow Engine
//!
//! Runs long-lived, multi-stage workflows and lets any number of
//! observers follow and control them.
//!
//! # Architecture
//!
//! The [`WorkflowRegistry`] is the aggregation root and composes:
//!
//! - [`WorkflowStateMachine`]: lifecycle transitions as a total function
//! - [`StageTracker`]: ordered stage completion and aggregate percent
//! - [`QualityGateEvaluator`]: pass/fail checks attached to stages
//! - [`RetryController`]: re-entry of failed or cancelled workflows
//! - [`ProgressBroadcaster`]: fan-out of [`ProgressEvent`]s
//! - [`WorkflowStore`]: history of deleted workflows
//!
//! Stages are either driven by an attached [`StageExecutor`], one runner
//! task per workflow, or reported by the caller through
//! [`WorkflowRegistry::report_stage`].
//!
//! # Example
//!
//! ```rust,no_run
//! use stagewise_engine::*;
//! use stagewise_types::*;
//! use serde_json::json;
//!
//! # async fn demo() -> WorkflowResult<()> {
//! let registry = WorkflowRegistry::new(EngineConfig::default());
//! let id = registry
//!     .create_and_start(CreateWorkflowRequest::new("Quarterly report", json!("Q3 numbers")))
//!     .await?;
//!
//! registry
//!     .report_stage(&id, 1, StageOutcome::Completed(json!({ "rows": 42 })))
//!     .await?;
//! registry.pause(&id).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod broadcaster;
pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod gate_evaluator;
pub mod registry;
pub mod retry_controller;
mod runner;
pub mod stage_tracker;
pub mod state_machine;
pub mod store;

pub use broadcaster::{ProgressBroadcaster, ProgressSubscription, SubscriptionFilter};
pub use checkpoint::{run_signal, CheckpointToken, RunSignal};
pub use config::EngineConfig;
pub use executor::{ProgressReporter, StageContext, StageError, StageExecutor};
pub use gate_evaluator::{
    AcceptAllGates, FnGateCheck, GateCheck, GateOutcome, GateVerdict, QualityGateEvaluator,
};
pub use registry::{WorkflowRegistry, WorkflowRegistryBuilder};
pub use retry_controller::{RetryController, RetryPlan};
pub use stage_tracker::{compute_percent, StageAdvance, StageOutcome, StageSnapshot, StageTracker};
pub use state_machine::{transition, WorkflowStateMachine};
pub use store::{InMemoryWorkflowStore, WorkflowStore};

// Re-export the domain types so callers need a single dependency
pub use stagewise_types::ProgressEvent;
