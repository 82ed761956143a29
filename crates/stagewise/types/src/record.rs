//! Workflow records: identity plus mutable execution state
//!
//! A `WorkflowRecord` is mutated only by the engine's state machine and
//! stage tracker, under the record's own lock. Everything handed to
//! callers is a clone of it or a projection of it.

use crate::{
    GateId, GateResult, OverallProgress, StageSpec, StageStatus, WorkflowId, WorkflowStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Stage ────────────────────────────────────────────────────────────

/// One unit of work inside a workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// 1-based position, fixed at creation
    pub stage_index: u32,
    pub name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque stage output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Stage {
    fn from_spec(stage_index: u32, spec: &StageSpec) -> Self {
        Self {
            stage_index,
            name: spec.name.clone(),
            status: StageStatus::Pending,
            optional: spec.optional,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    /// Put the stage back in line for another execution
    pub fn reset(&mut self) {
        self.status = StageStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.output = None;
        self.error = None;
    }
}

// ── Quality Gate ─────────────────────────────────────────────────────

/// A pass/fail checkpoint attached to a stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGate {
    pub gate_id: GateId,
    /// Index of the stage this gate guards
    pub stage_index: u32,
    pub blocking: bool,
    pub result: GateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl QualityGate {
    pub fn reset(&mut self) {
        self.result = GateResult::Pending;
        self.reason = None;
        self.evaluated_at = None;
    }
}

// ── Workflow Record ──────────────────────────────────────────────────

/// One workflow instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    #[serde(rename = "workflowId")]
    pub id: WorkflowId,
    pub title: String,
    pub description: String,
    pub input: Value,
    #[serde(default)]
    pub context: Value,
    pub status: WorkflowStatus,
    /// Index of the last checkpointed stage; 0 before any stage completes
    pub stage: u32,
    pub total_stages: u32,
    pub percent: u8,
    /// Accumulated running time of closed intervals, in milliseconds
    #[serde(rename = "elapsedTime")]
    pub elapsed_ms: u64,
    /// Start of the currently open running interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_since: Option<DateTime<Utc>>,
    /// Fraction of the current stage reported done, in `[0, 1)`
    #[serde(default)]
    pub intra_stage_fraction: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Execution generation; incremented by every retry
    pub attempt: u32,
    /// Sequence number of the last emitted progress event
    pub event_sequence: u64,
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<QualityGate>,
}

impl WorkflowRecord {
    /// Allocate an idle record from an already-validated plan
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        input: Value,
        context: Value,
        plan: &[StageSpec],
        now: DateTime<Utc>,
    ) -> Self {
        let stages: Vec<Stage> = plan
            .iter()
            .enumerate()
            .map(|(i, spec)| Stage::from_spec(i as u32 + 1, spec))
            .collect();

        let gates = plan
            .iter()
            .enumerate()
            .flat_map(|(i, spec)| {
                spec.gates.iter().map(move |gate| QualityGate {
                    gate_id: gate.gate_id.clone(),
                    stage_index: i as u32 + 1,
                    blocking: gate.blocking,
                    result: GateResult::Pending,
                    reason: None,
                    evaluated_at: None,
                })
            })
            .collect();

        Self {
            id: WorkflowId::generate(),
            title: title.into(),
            description: description.into(),
            input,
            context,
            status: WorkflowStatus::Idle,
            stage: 0,
            total_stages: stages.len() as u32,
            percent: 0,
            elapsed_ms: 0,
            running_since: None,
            intra_stage_fraction: 0.0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            last_error: None,
            attempt: 1,
            event_sequence: 0,
            stages,
            gates,
        }
    }

    // ── Query methods ────────────────────────────────────────────────

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    /// Stage by 1-based index
    pub fn stage_at(&self, stage_index: u32) -> Option<&Stage> {
        let i = stage_index.checked_sub(1)?;
        self.stages.get(i as usize)
    }

    pub fn stage_at_mut(&mut self, stage_index: u32) -> Option<&mut Stage> {
        let i = stage_index.checked_sub(1)?;
        self.stages.get_mut(i as usize)
    }

    /// Gates attached to a stage, in declaration order
    pub fn gates_for_stage(
        &self,
        stage_index: u32,
    ) -> impl Iterator<Item = &QualityGate> + '_ {
        self.gates
            .iter()
            .filter(move |g| g.stage_index == stage_index)
    }

    /// Number of stages that completed or were skipped
    pub fn checkpointed_count(&self) -> u32 {
        self.stages
            .iter()
            .filter(|s| s.status.is_checkpointed())
            .count() as u32
    }

    /// The first stage that has not been checkpointed, if any
    pub fn first_open_stage(&self) -> Option<u32> {
        self.stages
            .iter()
            .find(|s| !s.status.is_checkpointed())
            .map(|s| s.stage_index)
    }

    /// Outputs of the checkpointed stages, in stage order
    pub fn stage_outputs(&self) -> Vec<Value> {
        self.stages
            .iter()
            .filter(|s| s.status.is_checkpointed())
            .map(|s| s.output.clone().unwrap_or(Value::Null))
            .collect()
    }

    /// Active running time up to `now`; does not advance while paused
    pub fn elapsed_ms_at(&self, now: DateTime<Utc>) -> u64 {
        let open = self
            .running_since
            .map(|since| now.signed_duration_since(since).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        self.elapsed_ms.saturating_add(open)
    }

    // ── Running interval accounting ─────────────────────────────────

    pub fn open_running_interval(&mut self, now: DateTime<Utc>) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Fold the open interval into `elapsed_ms`
    pub fn close_running_interval(&mut self, now: DateTime<Utc>) {
        self.elapsed_ms = self.elapsed_ms_at(now);
        self.running_since = None;
    }

    // ── Projections ──────────────────────────────────────────────────

    pub fn progress(&self, now: DateTime<Utc>) -> OverallProgress {
        OverallProgress {
            status: self.status,
            percent: self.percent,
            stage: self.stage,
            total_stages: self.total_stages,
            elapsed_time: self.elapsed_ms_at(now),
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> WorkflowSummary {
        WorkflowSummary {
            workflow_id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            stage: self.stage,
            total_stages: self.total_stages,
            percent: self.percent,
            elapsed_time: self.elapsed_ms_at(now),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            last_error: self.last_error.clone(),
            attempt: self.attempt,
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────

/// List-view projection of a workflow record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub workflow_id: WorkflowId,
    pub title: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub stage: u32,
    pub total_stages: u32,
    pub percent: u8,
    pub elapsed_time: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub attempt: u32,
}
