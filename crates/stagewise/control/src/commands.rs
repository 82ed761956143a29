//! Command and event envelopes of the control channel
//!
//! Commands travel as `{"method": "workflow.pause", "params": {...}}` and
//! are answered with a [`CommandResponse`]. Progress travels the other
//! way as `workflow.progress` notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagewise_types::{CreateWorkflowRequest, ProgressEvent, WorkflowError, WorkflowId};

/// Method name of progress notifications
pub const PROGRESS_METHOD: &str = "workflow.progress";

/// Parameters addressing a single workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRef {
    pub workflow_id: WorkflowId,
}

impl From<WorkflowId> for WorkflowRef {
    fn from(workflow_id: WorkflowId) -> Self {
        Self { workflow_id }
    }
}

/// A request on the control channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Command {
    #[serde(rename = "workflow.getAll")]
    GetAll,

    #[serde(rename = "workflow.createAndStart")]
    CreateAndStart(CreateWorkflowRequest),

    #[serde(rename = "workflow.pause")]
    Pause(WorkflowRef),

    #[serde(rename = "workflow.resume")]
    Resume(WorkflowRef),

    #[serde(rename = "workflow.retry")]
    Retry(WorkflowRef),

    #[serde(rename = "workflow.cancel")]
    Cancel(WorkflowRef),

    #[serde(rename = "workflow.delete")]
    Delete(WorkflowRef),

    #[serde(rename = "workflow.get")]
    Get(WorkflowRef),

    #[serde(rename = "workflow.getStages")]
    GetStages(WorkflowRef),

    #[serde(rename = "workflow.getGates")]
    GetGates(WorkflowRef),

    #[serde(rename = "workflow.getHistory")]
    GetHistory,
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetAll => "workflow.getAll",
            Self::CreateAndStart(_) => "workflow.createAndStart",
            Self::Pause(_) => "workflow.pause",
            Self::Resume(_) => "workflow.resume",
            Self::Retry(_) => "workflow.retry",
            Self::Cancel(_) => "workflow.cancel",
            Self::Delete(_) => "workflow.delete",
            Self::Get(_) => "workflow.get",
            Self::GetStages(_) => "workflow.getStages",
            Self::GetGates(_) => "workflow.getGates",
            Self::GetHistory => "workflow.getHistory",
        }
    }

    /// The workflow a command addresses, if any
    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        match self {
            Self::Pause(r)
            | Self::Resume(r)
            | Self::Retry(r)
            | Self::Cancel(r)
            | Self::Delete(r)
            | Self::Get(r)
            | Self::GetStages(r)
            | Self::GetGates(r) => Some(&r.workflow_id),
            Self::GetAll | Self::CreateAndStart(_) | Self::GetHistory => None,
        }
    }
}

/// Error payload of a failed command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub kind: String,
    pub message: String,
}

impl From<&WorkflowError> for CommandError {
    fn from(e: &WorkflowError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Response to a [`Command`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Success with nothing to return
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CommandError {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }
}

impl From<&WorkflowError> for CommandResponse {
    fn from(e: &WorkflowError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(e.into()),
        }
    }
}

/// A `workflow.progress` notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    pub params: ProgressEvent,
}

impl Notification {
    pub fn progress(event: ProgressEvent) -> Self {
        Self {
            method: PROGRESS_METHOD.to_string(),
            params: event,
        }
    }
}
