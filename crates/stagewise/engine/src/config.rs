//! Engine configuration

use serde::{Deserialize, Serialize};
use stagewise_types::StageSpec;
use std::time::Duration;

/// Tunables for a [`WorkflowRegistry`](crate::WorkflowRegistry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each progress event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Stage plan used when a create request does not carry one
    #[serde(default = "default_stages")]
    pub default_stages: Vec<StageSpec>,

    /// Upper bound on non-terminal workflows; 0 means unbounded
    #[serde(default = "default_max_active_workflows")]
    pub max_active_workflows: usize,

    /// Per-stage execution timeout in milliseconds
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            default_stages: default_stages(),
            max_active_workflows: default_max_active_workflows(),
            stage_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_default_stages(mut self, stages: Vec<StageSpec>) -> Self {
        self.default_stages = stages;
        self
    }
}

// Default value helpers
fn default_event_channel_capacity() -> usize {
    1024
}

fn default_stages() -> Vec<StageSpec> {
    stagewise_types::stages_named(["analyze", "plan", "execute", "review", "refine", "finalize"])
}

fn default_max_active_workflows() -> usize {
    64
}
