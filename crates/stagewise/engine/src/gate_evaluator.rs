//! Gate evaluator: decides whether a stage's quality gates let it pass
//!
//! The check logic of each gate belongs to a [`GateCheck`] collaborator.
//! The evaluator only runs the checks in declaration order, records
//! their results on the record, and reports whether any blocking gate
//! rejected the stage. Given the same checks it always decides the same.

use chrono::{DateTime, Utc};
use stagewise_types::{GateId, GateResult, QualityGate, Stage, WorkflowRecord};
use std::fmt;
use std::sync::Arc;

/// Verdict of a single gate check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Fail { reason: String },
}

impl GateVerdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

/// External check logic for quality gates
pub trait GateCheck: Send + Sync {
    fn check(&self, gate: &QualityGate, stage: &Stage) -> GateVerdict;
}

/// Passes every gate
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllGates;

impl GateCheck for AcceptAllGates {
    fn check(&self, _gate: &QualityGate, _stage: &Stage) -> GateVerdict {
        GateVerdict::Pass
    }
}

/// Adapts a closure into a [`GateCheck`]
pub struct FnGateCheck<F>(pub F);

impl<F> GateCheck for FnGateCheck<F>
where
    F: Fn(&QualityGate, &Stage) -> GateVerdict + Send + Sync,
{
    fn check(&self, gate: &QualityGate, stage: &Stage) -> GateVerdict {
        (self.0)(gate, stage)
    }
}

/// Result of evaluating every gate of a stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// No blocking gate failed
    Passed,
    /// The first blocking gate that failed
    Blocked { gate_id: GateId, reason: String },
}

impl GateOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Evaluates the quality gates attached to a completed stage
#[derive(Clone)]
pub struct QualityGateEvaluator {
    check: Arc<dyn GateCheck>,
}

impl QualityGateEvaluator {
    pub fn new(check: Arc<dyn GateCheck>) -> Self {
        Self { check }
    }

    /// Evaluate all gates of `stage_index`, recording each result.
    ///
    /// Advisory gates that fail are recorded but do not block.
    pub fn evaluate(
        &self,
        record: &mut WorkflowRecord,
        stage_index: u32,
        now: DateTime<Utc>,
    ) -> GateOutcome {
        let Some(stage) = record.stage_at(stage_index).cloned() else {
            return GateOutcome::Passed;
        };
        let workflow_id = record.id.clone();

        let mut outcome = GateOutcome::Passed;
        for gate in record
            .gates
            .iter_mut()
            .filter(|g| g.stage_index == stage_index)
        {
            let verdict = self.check.check(gate, &stage);
            gate.evaluated_at = Some(now);
            match verdict {
                GateVerdict::Pass => {
                    gate.result = GateResult::Passed;
                    gate.reason = None;
                }
                GateVerdict::Fail { reason } => {
                    gate.result = GateResult::Failed;
                    gate.reason = Some(reason.clone());

                    if !gate.blocking {
                        tracing::warn!(
                            workflow_id = %workflow_id,
                            gate_id = %gate.gate_id,
                            stage = stage_index,
                            reason = %reason,
                            "Advisory quality gate failed"
                        );
                    } else if outcome.is_passed() {
                        outcome = GateOutcome::Blocked {
                            gate_id: gate.gate_id.clone(),
                            reason,
                        };
                    }
                }
            }
        }
        outcome
    }
}

impl Default for QualityGateEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(AcceptAllGates))
    }
}

impl fmt::Debug for QualityGateEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityGateEvaluator").finish_non_exhaustive()
    }
}
