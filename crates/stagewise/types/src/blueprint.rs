//! Blueprints: the stage plan and creation request a workflow starts from
//!
//! Stage ordering is fixed at creation. A blueprint is resolved once into
//! the record's `stages` and `gates` and is never reordered afterwards.

use crate::{GateId, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

// ── Gate Spec ────────────────────────────────────────────────────────

/// Declaration of a quality gate attached to a stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSpec {
    pub gate_id: GateId,
    /// A failed blocking gate fails the workflow. A failed advisory gate
    /// is recorded and progression continues.
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

fn default_blocking() -> bool {
    true
}

impl GateSpec {
    pub fn blocking(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: GateId::new(gate_id),
            blocking: true,
        }
    }

    pub fn advisory(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: GateId::new(gate_id),
            blocking: false,
        }
    }
}

// ── Stage Spec ───────────────────────────────────────────────────────

/// Declaration of one stage in a workflow blueprint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    pub name: String,
    /// An optional stage that errors is skipped instead of failing the workflow
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<GateSpec>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            gates: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_gate(mut self, gate: GateSpec) -> Self {
        self.gates.push(gate);
        self
    }
}

/// Build a plain stage plan from names
pub fn stages_named<I, S>(names: I) -> Vec<StageSpec>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(StageSpec::new).collect()
}

// ── Create Request ───────────────────────────────────────────────────

/// A create-and-start request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Opaque user payload
    #[serde(default)]
    pub input: Value,
    /// Opaque caller context, handed to every stage
    #[serde(default)]
    pub context: Value,
    /// Stage plan; empty means the engine's default plan
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageSpec>,
}

impl CreateWorkflowRequest {
    pub fn new(title: impl Into<String>, input: impl Into<Value>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            input: input.into(),
            context: Value::Null,
            stages: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_stages(mut self, stages: Vec<StageSpec>) -> Self {
        self.stages = stages;
        self
    }

    /// Check the request and resolve its stage plan against the defaults.
    pub fn resolve_plan(&self, defaults: &[StageSpec]) -> WorkflowResult<Vec<StageSpec>> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::Validation("title must not be empty".into()));
        }
        if is_empty_payload(&self.input) {
            return Err(WorkflowError::Validation("input must not be empty".into()));
        }

        let plan = if self.stages.is_empty() {
            defaults.to_vec()
        } else {
            self.stages.clone()
        };
        if plan.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow must have at least one stage".into(),
            ));
        }

        let mut seen = HashSet::new();
        for (position, stage) in plan.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "stage {} has an empty name",
                    position + 1
                )));
            }
            for gate in &stage.gates {
                if !seen.insert(gate.gate_id.clone()) {
                    return Err(WorkflowError::Validation(format!(
                        "duplicate gate id '{}'",
                        gate.gate_id
                    )));
                }
            }
        }

        Ok(plan)
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
