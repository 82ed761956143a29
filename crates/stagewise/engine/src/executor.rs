//! Stage execution collaborators
//!
//! What a stage computes is not the engine's concern. The registry hands
//! each stage to a [`StageExecutor`] together with a [`StageContext`]
//! and records whatever comes back.

use crate::checkpoint::CheckpointToken;
use crate::registry::WorkflowRegistry;
use async_trait::async_trait;
use serde_json::Value;
use stagewise_types::{WorkflowId, WorkflowResult};

/// Error returned by stage implementations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("Stage failed: {0}")]
    Failed(String),

    /// The stage stopped at a checkpoint because the workflow was cancelled
    #[error("Stage interrupted")]
    Interrupted,
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Everything a stage implementation gets to see
#[derive(Clone, Debug)]
pub struct StageContext {
    pub workflow_id: WorkflowId,
    pub stage_index: u32,
    pub stage_name: String,
    pub attempt: u32,
    pub input: Value,
    pub context: Value,
    /// Outputs of the checkpointed stages, in order
    pub previous_outputs: Vec<Value>,
    pub checkpoint: CheckpointToken,
    pub progress: ProgressReporter,
}

/// Executes one stage of a workflow
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError>;
}

/// Reports intra-stage progress back to the owning registry
#[derive(Clone)]
pub struct ProgressReporter {
    registry: Option<WorkflowRegistry>,
    workflow_id: WorkflowId,
    stage_index: u32,
    attempt: u32,
}

impl ProgressReporter {
    pub(crate) fn new(
        registry: WorkflowRegistry,
        workflow_id: WorkflowId,
        stage_index: u32,
        attempt: u32,
    ) -> Self {
        Self {
            registry: Some(registry),
            workflow_id,
            stage_index,
            attempt,
        }
    }

    /// A reporter not attached to any registry; reports are dropped.
    /// Useful when driving an executor directly in tests.
    pub fn detached(workflow_id: WorkflowId, stage_index: u32) -> Self {
        Self {
            registry: None,
            workflow_id,
            stage_index,
            attempt: 1,
        }
    }

    /// Report that `fraction` of the stage is done
    pub async fn report(&self, fraction: f64) -> WorkflowResult<()> {
        match &self.registry {
            Some(registry) => {
                registry
                    .apply_progress(
                        &self.workflow_id,
                        self.stage_index,
                        Some(self.attempt),
                        fraction,
                    )
                    .await
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("workflow_id", &self.workflow_id)
            .field("stage_index", &self.stage_index)
            .field("attempt", &self.attempt)
            .field("attached", &self.registry.is_some())
            .finish()
    }
}
