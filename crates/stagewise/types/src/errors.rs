//! Error types for the workflow layer

use crate::{GateId, Operation, WorkflowId, WorkflowStatus};

/// Errors that can occur in workflow operations
///
/// `Validation`, `NotFound`, `InvalidTransition` and `InvalidState` are
/// returned to the caller and never mutate engine state. `StageSequence`,
/// `GateFailure` and `Execution` are execution-time errors: they are
/// captured into `lastError` and drive the workflow to `failed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("Invalid transition: cannot {operation} a workflow that is {status}")]
    InvalidTransition {
        status: WorkflowStatus,
        operation: Operation,
    },

    #[error("Invalid state: cannot {operation} a workflow that is {status}")]
    InvalidState {
        status: WorkflowStatus,
        operation: String,
    },

    #[error("Stage sequence error: expected stage {expected}, got stage {actual}")]
    StageSequence { expected: u32, actual: u32 },

    #[error("Quality gate '{gate_id}' failed: {reason}")]
    GateFailure { gate_id: GateId, reason: String },

    #[error("Stage execution failed: {0}")]
    Execution(String),

    #[error("Workflow store error: {0}")]
    Store(String),
}

impl WorkflowError {
    /// Stable machine-readable kind, used on the command channel
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidState { .. } => "invalid_state",
            Self::StageSequence { .. } => "stage_sequence_error",
            Self::GateFailure { .. } => "gate_failure",
            Self::Execution(_) => "execution_error",
            Self::Store(_) => "store_error",
        }
    }

    /// Execution-time errors fail the workflow they occurred in
    pub fn fails_workflow(&self) -> bool {
        matches!(
            self,
            Self::StageSequence { .. } | Self::GateFailure { .. } | Self::Execution(_)
        )
    }

    /// The text stored in `lastError` when this error fails a workflow
    pub fn last_error_text(&self) -> String {
        match self {
            Self::GateFailure { reason, .. } => reason.clone(),
            Self::Execution(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
