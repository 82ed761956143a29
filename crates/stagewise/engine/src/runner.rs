//! Per-workflow runner task
//!
//! One runner drives one execution generation of a workflow: it begins
//! the current stage, hands it to the executor and feeds the result
//! back through the registry. A retry's runner first waits for the
//! previous generation to exit. It parks at checkpoints while the
//! workflow is paused and exits once the workflow is terminal, deleted,
//! cancelled or superseded by a retry.

use crate::checkpoint::CheckpointToken;
use crate::executor::{StageContext, StageError, StageExecutor};
use crate::registry::{RunnerApply, RunnerStep, WorkflowRegistry};
use crate::stage_tracker::StageOutcome;
use serde_json::Value;
use stagewise_types::WorkflowId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) async fn run(
    registry: WorkflowRegistry,
    executor: Arc<dyn StageExecutor>,
    id: WorkflowId,
    attempt: u32,
    token: CheckpointToken,
    stage_timeout: Option<Duration>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        debug!(workflow_id = %id, attempt, "Waiting for previous runner to exit");
        if let Err(e) = previous.await {
            warn!(workflow_id = %id, attempt, error = %e, "Previous runner ended abnormally");
        }
    }

    info!(workflow_id = %id, attempt, "Runner started");

    'run: loop {
        if token.checkpoint().await.is_err() {
            break;
        }

        let ctx = match registry.begin_next_stage(&id, attempt, &token).await {
            RunnerStep::Begin(ctx) => *ctx,
            RunnerStep::Hold => continue,
            RunnerStep::Stop => break,
        };
        let stage_index = ctx.stage_index;

        let outcome = match execute(executor.as_ref(), ctx, stage_timeout).await {
            Ok(output) => StageOutcome::Completed(output),
            Err(StageError::Failed(message)) => StageOutcome::Failed(message),
            Err(StageError::Interrupted) if token.is_cancelled() => break,
            Err(StageError::Interrupted) => StageOutcome::Failed("stage interrupted".to_string()),
        };

        // A result that lands while paused is held until resume
        loop {
            if token.checkpoint().await.is_err() {
                debug!(workflow_id = %id, stage = stage_index, "Discarding result of cancelled stage");
                break 'run;
            }
            match registry
                .apply_runner_outcome(&id, attempt, stage_index, outcome.clone())
                .await
            {
                RunnerApply::Continue => break,
                RunnerApply::Hold => continue,
                RunnerApply::Stop => break 'run,
            }
        }
    }

    info!(workflow_id = %id, attempt, "Runner stopped");
}

async fn execute(
    executor: &dyn StageExecutor,
    ctx: StageContext,
    stage_timeout: Option<Duration>,
) -> Result<Value, StageError> {
    let work = executor.execute(ctx);
    match stage_timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Failed(format!(
                "stage timed out after {}ms",
                limit.as_millis()
            ))),
        },
        None => work.await,
    }
}
