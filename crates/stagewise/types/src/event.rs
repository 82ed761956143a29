//! Progress events: immutable snapshots broadcast on every state change

use crate::{WorkflowId, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate progress of a workflow at one instant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub status: WorkflowStatus,
    pub percent: u8,
    pub stage: u32,
    pub total_stages: u32,
    /// Active running time in milliseconds
    pub elapsed_time: u64,
}

/// Snapshot published on the `workflow.progress` stream
///
/// Completion and failure are not separate events; they are this event
/// with `overall.status` set to `completed` or `failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub workflow_id: WorkflowId,
    /// Per-workflow sequence number, strictly increasing from 1
    pub sequence: u64,
    pub overall: OverallProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.overall.status.is_terminal()
    }

    pub fn is_failure(&self) -> bool {
        self.overall.status == WorkflowStatus::Failed
    }
}
