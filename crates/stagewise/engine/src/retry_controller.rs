//! Retry controller: resumes failed or cancelled workflows
//!
//! Retry never re-runs checkpointed stages. Everything from the first
//! open stage onwards goes back to `pending`, along with the gates that
//! guard those stages.

use crate::stage_tracker::StageTracker;
use crate::state_machine::{transition, WorkflowStateMachine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagewise_types::*;

/// Where a retried workflow picks up again
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPlan {
    /// First stage that will execute; `None` when every stage is done
    pub resume_stage: Option<u32>,
    pub percent: u8,
    pub attempt: u32,
}

#[derive(Clone, Debug, Default)]
pub struct RetryController {
    tracker: StageTracker,
}

impl RetryController {
    pub fn new(tracker: StageTracker) -> Self {
        Self { tracker }
    }

    /// Reopen a `failed` or `cancelled` workflow for execution.
    ///
    /// Illegal from any other status; the record is left untouched then.
    pub fn reopen(
        &self,
        record: &mut WorkflowRecord,
        state_machine: &WorkflowStateMachine,
        now: DateTime<Utc>,
    ) -> WorkflowResult<RetryPlan> {
        transition(record.status, Operation::Retry)?;

        let previous = record.status;
        let resume_from = record.first_open_stage();
        if let Some(first_open) = resume_from {
            let reset: Vec<u32> = record
                .stages
                .iter_mut()
                .filter(|s| s.stage_index >= first_open && !s.status.is_checkpointed())
                .map(|s| {
                    s.reset();
                    s.stage_index
                })
                .collect();
            for gate in record
                .gates
                .iter_mut()
                .filter(|g| reset.contains(&g.stage_index))
            {
                gate.reset();
            }
        }

        record.last_error = None;
        record.attempt += 1;
        self.tracker.rewind_percent(record);

        tracing::info!(
            workflow_id = %record.id,
            from = %previous,
            attempt = record.attempt,
            resume_stage = ?resume_from,
            "Retrying workflow"
        );

        state_machine.apply(record, Operation::Retry, now)?;

        Ok(RetryPlan {
            resume_stage: resume_from,
            percent: record.percent,
            attempt: record.attempt,
        })
    }
}
