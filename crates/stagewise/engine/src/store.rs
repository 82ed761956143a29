//! History storage for deleted workflows
//!
//! Deleting a workflow archives its final record here before it leaves
//! the registry. The in-memory store suits development and tests;
//! persistent backends implement [`WorkflowStore`].

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use stagewise_types::{WorkflowId, WorkflowRecord, WorkflowResult, WorkflowSummary};

/// Trait for workflow history backends
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Archive a record, replacing any earlier archive of the same id
    async fn archive(&self, record: WorkflowRecord) -> WorkflowResult<()>;

    /// Load an archived record by id
    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Option<WorkflowRecord>>;

    /// Summaries of every archived record, oldest first
    async fn list(&self) -> WorkflowResult<Vec<WorkflowSummary>>;

    async fn contains(&self, id: &WorkflowId) -> WorkflowResult<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

/// In-memory workflow history
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    records: DashMap<WorkflowId, WorkflowRecord>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn archive(&self, record: WorkflowRecord) -> WorkflowResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Option<WorkflowRecord>> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn list(&self) -> WorkflowResult<Vec<WorkflowSummary>> {
        let now = Utc::now();
        let mut summaries: Vec<WorkflowSummary> = self
            .records
            .iter()
            .map(|entry| entry.value().summary(now))
            .collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.workflow_id.cmp(&b.workflow_id))
        });
        Ok(summaries)
    }
}
