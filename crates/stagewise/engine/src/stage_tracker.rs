//! Stage tracker: ordered stage completion and aggregate progress
//!
//! `record.stage` is the index of the last checkpointed stage, so the
//! current stage is always the first stage that has not completed.
//! Percent is `floor(100 * (checkpointed + intra_stage_fraction) / total)`
//! and never decreases while the workflow is running.

use crate::gate_evaluator::{GateOutcome, QualityGateEvaluator};
use chrono::{DateTime, Utc};
use serde_json::Value;
use stagewise_types::*;

/// Intra-stage progress never reports a stage as fully done
const MAX_INTRA_STAGE_FRACTION: f64 = 0.99;

/// What a stage reported when it finished
#[derive(Clone, Debug, PartialEq)]
pub enum StageOutcome {
    Completed(Value),
    Failed(String),
}

/// Effect of a successful `advance`
#[derive(Clone, Debug, PartialEq)]
pub enum StageAdvance {
    /// The stage was checkpointed and more stages remain
    Advanced { next_stage: u32 },
    /// The final stage was checkpointed with all blocking gates passed
    Finished,
    /// The stage failed; the workflow must transition to `failed`
    Failed(WorkflowError),
}

/// Read-only view of a record's stage progress
#[derive(Clone, Debug, PartialEq)]
pub struct StageSnapshot {
    pub overall: OverallProgress,
    pub current_stage: Option<u32>,
    pub stages: Vec<Stage>,
}

/// `floor(100 * (checkpointed + fraction) / total)` clamped to `[0, 100]`
pub fn compute_percent(checkpointed: u32, fraction: f64, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, MAX_INTRA_STAGE_FRACTION)
    } else {
        0.0
    };
    let done = (checkpointed.min(total) as f64 + fraction).min(total as f64);
    let percent = (100.0 * done / total as f64).floor();
    percent.clamp(0.0, 100.0) as u8
}

/// Advances stage state on a record
#[derive(Clone, Debug, Default)]
pub struct StageTracker {
    gates: QualityGateEvaluator,
}

impl StageTracker {
    pub fn new(gates: QualityGateEvaluator) -> Self {
        Self { gates }
    }

    /// The stage eligible for `advance`, if any remain
    pub fn current_stage(&self, record: &WorkflowRecord) -> Option<u32> {
        record.first_open_stage()
    }

    /// Mark the current stage as started
    pub fn begin(
        &self,
        record: &mut WorkflowRecord,
        stage_index: u32,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        self.check_current(record, stage_index, "begin stage")?;
        if let Some(stage) = record.stage_at_mut(stage_index) {
            stage.status = StageStatus::Running;
            stage.started_at = Some(now);
            stage.error = None;
        }
        record.updated_at = now;
        Ok(())
    }

    /// Record a stage result and run its gates.
    ///
    /// Errors (`InvalidState`, `StageSequence`) leave the record untouched.
    pub fn advance(
        &self,
        record: &mut WorkflowRecord,
        stage_index: u32,
        outcome: StageOutcome,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StageAdvance> {
        self.check_current(record, stage_index, "advance stage")?;

        let optional = record
            .stage_at(stage_index)
            .map(|s| s.optional)
            .unwrap_or(false);

        let failure = match outcome {
            StageOutcome::Completed(output) => {
                if let Some(stage) = record.stage_at_mut(stage_index) {
                    stage.output = Some(output);
                    stage.completed_at = Some(now);
                    stage.started_at.get_or_insert(now);
                }
                match self.gates.evaluate(record, stage_index, now) {
                    GateOutcome::Passed => {
                        self.set_stage_status(record, stage_index, StageStatus::Completed);
                        None
                    }
                    GateOutcome::Blocked { gate_id, reason } => {
                        Some(WorkflowError::GateFailure { gate_id, reason })
                    }
                }
            }
            StageOutcome::Failed(message) if optional => {
                tracing::warn!(
                    workflow_id = %record.id,
                    stage = stage_index,
                    error = %message,
                    "Optional stage failed, skipping"
                );
                if let Some(stage) = record.stage_at_mut(stage_index) {
                    stage.status = StageStatus::Skipped;
                    stage.completed_at = Some(now);
                    stage.error = Some(message);
                }
                None
            }
            StageOutcome::Failed(message) => Some(WorkflowError::Execution(message)),
        };

        record.updated_at = now;

        if let Some(error) = failure {
            if let Some(stage) = record.stage_at_mut(stage_index) {
                stage.status = StageStatus::Failed;
                stage.completed_at = Some(now);
                stage.error = Some(error.last_error_text());
            }
            return Ok(StageAdvance::Failed(error));
        }

        record.stage = stage_index;
        record.intra_stage_fraction = 0.0;
        self.raise_percent(record);

        tracing::debug!(
            workflow_id = %record.id,
            stage = stage_index,
            percent = record.percent,
            "Stage checkpointed"
        );

        Ok(match self.current_stage(record) {
            Some(next_stage) => StageAdvance::Advanced { next_stage },
            None => StageAdvance::Finished,
        })
    }

    /// Record intra-stage progress for the current stage.
    ///
    /// Returns whether the aggregate percent moved.
    pub fn report_progress(
        &self,
        record: &mut WorkflowRecord,
        stage_index: u32,
        fraction: f64,
        now: DateTime<Utc>,
    ) -> WorkflowResult<bool> {
        self.check_current(record, stage_index, "report progress")?;
        let before = record.percent;
        if fraction.is_finite() {
            let fraction = fraction.clamp(0.0, MAX_INTRA_STAGE_FRACTION);
            record.intra_stage_fraction = record.intra_stage_fraction.max(fraction);
        }
        self.raise_percent(record);
        record.updated_at = now;
        Ok(record.percent != before)
    }

    /// Recompute percent from checkpointed stages only; used on retry
    pub fn rewind_percent(&self, record: &mut WorkflowRecord) {
        record.intra_stage_fraction = 0.0;
        record.percent = compute_percent(record.checkpointed_count(), 0.0, record.total_stages);
    }

    /// Side-effect free view, safe to take while another task advances
    pub fn snapshot(&self, record: &WorkflowRecord, now: DateTime<Utc>) -> StageSnapshot {
        StageSnapshot {
            overall: record.progress(now),
            current_stage: self.current_stage(record),
            stages: record.stages.clone(),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn check_current(
        &self,
        record: &WorkflowRecord,
        stage_index: u32,
        operation: &str,
    ) -> WorkflowResult<()> {
        if !record.is_running() {
            return Err(WorkflowError::InvalidState {
                status: record.status,
                operation: operation.to_string(),
            });
        }
        // A running workflow with nothing left is about to complete;
        // any report is out of sequence.
        let expected = self
            .current_stage(record)
            .unwrap_or(record.total_stages + 1);
        if stage_index != expected {
            return Err(WorkflowError::StageSequence {
                expected,
                actual: stage_index,
            });
        }
        Ok(())
    }

    fn set_stage_status(&self, record: &mut WorkflowRecord, stage_index: u32, status: StageStatus) {
        if let Some(stage) = record.stage_at_mut(stage_index) {
            stage.status = status;
        }
    }

    fn raise_percent(&self, record: &mut WorkflowRecord) {
        let computed = compute_percent(
            record.checkpointed_count(),
            record.intra_stage_fraction,
            record.total_stages,
        );
        record.percent = record.percent.max(computed);
    }
}
