//! Closed status enums for workflows, stages and gates

use serde::{Deserialize, Serialize};

// ── Workflow Status ──────────────────────────────────────────────────

/// The lifecycle status of a workflow record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Allocated but not yet started
    #[default]
    Idle,
    /// Stages are being executed
    Running,
    /// Suspended by an explicit pause; no stage advances
    Paused,
    /// Every stage completed and every blocking gate passed
    Completed,
    /// A stage errored or a blocking gate rejected its output
    Failed,
    /// Stopped by an explicit cancellation
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 6] = [
        WorkflowStatus::Idle,
        WorkflowStatus::Running,
        WorkflowStatus::Paused,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
        WorkflowStatus::Cancelled,
    ];

    /// Completed, failed and cancelled are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Operation ────────────────────────────────────────────────────────

/// Lifecycle operations understood by the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Start,
    Pause,
    Resume,
    Complete,
    Fail,
    Cancel,
    Retry,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Start,
        Operation::Pause,
        Operation::Resume,
        Operation::Complete,
        Operation::Fail,
        Operation::Cancel,
        Operation::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Stage Status ─────────────────────────────────────────────────────

/// Execution status of a single stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// An optional stage that errored and was passed over
    Skipped,
}

impl StageStatus {
    /// A checkpointed stage never executes again, not even on retry
    pub fn is_checkpointed(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

// ── Gate Result ──────────────────────────────────────────────────────

/// Outcome of a quality gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GateResult {
    #[default]
    Pending,
    Passed,
    Failed,
}
