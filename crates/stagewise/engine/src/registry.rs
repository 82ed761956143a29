//! Workflow registry: the addressable collection of workflow records
//!
//! Locking is two-level. The registry map lock guards structure
//! (create, delete, list) and each record has its own lock for state
//! mutation. Whenever both are needed the map lock is taken first.
//! Progress events are published while the record lock is held, which
//! keeps them FIFO per workflow.

use crate::broadcaster::{ProgressBroadcaster, ProgressSubscription, SubscriptionFilter};
use crate::checkpoint::{run_signal, CheckpointToken, RunSignal};
use crate::config::EngineConfig;
use crate::executor::{ProgressReporter, StageContext, StageExecutor};
use crate::gate_evaluator::{GateCheck, QualityGateEvaluator};
use crate::retry_controller::{RetryController, RetryPlan};
use crate::runner;
use crate::stage_tracker::{StageAdvance, StageOutcome, StageSnapshot, StageTracker};
use crate::state_machine::{transition, WorkflowStateMachine};
use crate::store::{InMemoryWorkflowStore, WorkflowStore};
use chrono::{DateTime, Utc};
use stagewise_types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

type SlotHandle = Arc<RwLock<WorkflowSlot>>;

/// A record plus the control handle of its current runner
struct WorkflowSlot {
    record: WorkflowRecord,
    signal: Option<watch::Sender<RunSignal>>,
    /// Task of the newest runner generation; a retry's runner waits on it
    runner: Option<JoinHandle<()>>,
    deleted: bool,
}

impl WorkflowSlot {
    fn send_signal(&self, signal: RunSignal) {
        if let Some(tx) = &self.signal {
            tx.send_replace(signal);
        }
    }

    /// Whether a runner of generation `attempt` may still act on this slot
    fn is_current(&self, attempt: u32) -> bool {
        !self.deleted && self.record.attempt == attempt
    }
}

struct Shared {
    config: EngineConfig,
    records: RwLock<HashMap<WorkflowId, SlotHandle>>,
    state_machine: WorkflowStateMachine,
    tracker: StageTracker,
    retry: RetryController,
    executor: Option<Arc<dyn StageExecutor>>,
    store: Arc<dyn WorkflowStore>,
}

/// What the runner should do next
pub(crate) enum RunnerStep {
    Begin(Box<StageContext>),
    Hold,
    Stop,
}

/// Result of handing a finished stage back to the registry
pub(crate) enum RunnerApply {
    Continue,
    Hold,
    Stop,
}

/// Process-wide table of workflows
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct WorkflowRegistry {
    shared: Arc<Shared>,
}

impl WorkflowRegistry {
    /// Registry with default collaborators and no stage executor
    pub fn new(config: EngineConfig) -> Self {
        WorkflowRegistryBuilder::new().with_config(config).build()
    }

    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        self.shared.state_machine.broadcaster()
    }

    /// Whether stages are driven by an attached executor
    pub fn is_self_driving(&self) -> bool {
        self.shared.executor.is_some()
    }

    // ── Structural operations ────────────────────────────────────────

    /// Allocate a record, start it and return its id
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_and_start(&self, request: CreateWorkflowRequest) -> WorkflowResult<WorkflowId> {
        let plan = request.resolve_plan(&self.shared.config.default_stages)?;

        let mut records = self.shared.records.write().await;

        let limit = self.shared.config.max_active_workflows;
        if limit > 0 {
            let mut active = 0;
            for slot in records.values() {
                if !slot.read().await.record.is_terminal() {
                    active += 1;
                }
            }
            if active >= limit {
                return Err(WorkflowError::Validation(format!(
                    "too many active workflows (limit {limit})"
                )));
            }
        }

        let now = Utc::now();
        let mut record = WorkflowRecord::new(
            request.title,
            request.description,
            request.input,
            request.context,
            &plan,
            now,
        );
        let id = record.id.clone();

        info!(
            workflow_id = %id,
            total_stages = record.total_stages,
            "Workflow created"
        );

        self.broadcaster().open(&id);
        self.shared.state_machine.apply(&mut record, Operation::Start, now)?;

        // The runner blocks on the map lock until the slot is inserted
        let (signal, token) = self.signal_channel();
        let runner = token.and_then(|token| {
            self.spawn_runner(id.clone(), record.attempt, token, None)
        });
        records.insert(
            id.clone(),
            Arc::new(RwLock::new(WorkflowSlot {
                record,
                signal,
                runner,
                deleted: false,
            })),
        );

        Ok(id)
    }

    /// Remove a workflow that is not running and archive its final record.
    ///
    /// The archive write happens after every lock is released, so a slow
    /// store does not stall the rest of the registry.
    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn delete(&self, id: &WorkflowId) -> WorkflowResult<()> {
        let archived = {
            let mut records = self.shared.records.write().await;
            let handle = records
                .get(id)
                .cloned()
                .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
            let mut slot = handle.write().await;

            if slot.record.is_running() {
                return Err(WorkflowError::InvalidState {
                    status: slot.record.status,
                    operation: "delete".to_string(),
                });
            }

            slot.deleted = true;
            if let Some(tx) = slot.signal.take() {
                tx.send_replace(RunSignal::Cancel);
            }
            records.remove(id);
            self.broadcaster().close(id);

            info!(workflow_id = %id, status = %slot.record.status, "Workflow deleted");
            slot.record.clone()
        };

        if let Err(e) = self.shared.store.archive(archived).await {
            warn!(workflow_id = %id, error = %e, "Could not archive deleted workflow");
            return Err(e);
        }
        Ok(())
    }

    /// Summaries of every workflow in the registry, oldest first
    pub async fn list(&self) -> Vec<WorkflowSummary> {
        let now = Utc::now();
        let handles: Vec<SlotHandle> = self.shared.records.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.read().await.record.summary(now));
        }
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.workflow_id.cmp(&b.workflow_id))
        });
        summaries
    }

    /// Summaries of deleted workflows
    pub async fn history(&self) -> WorkflowResult<Vec<WorkflowSummary>> {
        self.shared.store.list().await
    }

    // ── Read projections ─────────────────────────────────────────────

    /// Full snapshot of one record
    pub async fn get(&self, id: &WorkflowId) -> WorkflowResult<WorkflowRecord> {
        let handle = self.slot(id).await?;
        let slot = handle.read().await;
        Ok(slot.record.clone())
    }

    pub async fn get_stages(&self, id: &WorkflowId) -> WorkflowResult<Vec<Stage>> {
        let handle = self.slot(id).await?;
        let slot = handle.read().await;
        Ok(slot.record.stages.clone())
    }

    pub async fn get_gates(&self, id: &WorkflowId) -> WorkflowResult<Vec<QualityGate>> {
        let handle = self.slot(id).await?;
        let slot = handle.read().await;
        Ok(slot.record.gates.clone())
    }

    pub async fn snapshot(&self, id: &WorkflowId) -> WorkflowResult<StageSnapshot> {
        let handle = self.slot(id).await?;
        let slot = handle.read().await;
        Ok(self.shared.tracker.snapshot(&slot.record, Utc::now()))
    }

    /// Subscribe to progress events, globally or for one workflow
    pub async fn subscribe(&self, filter: SubscriptionFilter) -> WorkflowResult<ProgressSubscription> {
        if let SubscriptionFilter::Workflow(id) = &filter {
            // Existence check under the map lock so a concurrent delete
            // cannot slip between lookup and subscribe.
            let records = self.shared.records.read().await;
            if !records.contains_key(id) {
                return Err(WorkflowError::NotFound(id.clone()));
            }
            return self
                .broadcaster()
                .subscribe(&filter)
                .ok_or_else(|| WorkflowError::NotFound(id.clone()));
        }
        Ok(self.broadcaster().subscribe_all())
    }

    // ── Control operations ───────────────────────────────────────────

    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn pause(&self, id: &WorkflowId) -> WorkflowResult<()> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        self.shared
            .state_machine
            .apply(&mut slot.record, Operation::Pause, Utc::now())?;
        slot.send_signal(RunSignal::Pause);
        Ok(())
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn resume(&self, id: &WorkflowId) -> WorkflowResult<()> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        self.shared
            .state_machine
            .apply(&mut slot.record, Operation::Resume, Utc::now())?;
        slot.send_signal(RunSignal::Run);
        Ok(())
    }

    /// Cancel a running or paused workflow.
    ///
    /// An in-flight stage goes back to `pending`; its late result is
    /// discarded.
    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn cancel(&self, id: &WorkflowId) -> WorkflowResult<()> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        transition(slot.record.status, Operation::Cancel)?;

        for stage in slot
            .record
            .stages
            .iter_mut()
            .filter(|s| s.status == StageStatus::Running)
        {
            stage.reset();
        }
        slot.record.intra_stage_fraction = 0.0;

        self.shared
            .state_machine
            .apply(&mut slot.record, Operation::Cancel, Utc::now())?;
        if let Some(tx) = slot.signal.take() {
            tx.send_replace(RunSignal::Cancel);
        }
        Ok(())
    }

    /// Re-open a failed or cancelled workflow at its first open stage
    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn retry(&self, id: &WorkflowId) -> WorkflowResult<RetryPlan> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        let plan = self
            .shared
            .retry
            .reopen(&mut slot.record, &self.shared.state_machine, Utc::now())?;

        // The new generation starts only once the previous runner has
        // exited, so a cancelled stage never overlaps its re-execution.
        let (signal, token) = self.signal_channel();
        slot.signal = signal;
        if let Some(token) = token {
            let previous = slot.runner.take();
            slot.runner = self.spawn_runner(id.clone(), plan.attempt, token, previous);
        }
        Ok(plan)
    }

    // ── Externally-driven stage reporting ────────────────────────────

    /// Report a finished stage.
    ///
    /// An out-of-order report fails the workflow and is returned as
    /// `StageSequence`.
    #[instrument(skip(self, outcome), fields(workflow_id = %id, stage = stage_index))]
    pub async fn report_stage(
        &self,
        id: &WorkflowId,
        stage_index: u32,
        outcome: StageOutcome,
    ) -> WorkflowResult<StageAdvance> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        self.apply_outcome(&mut slot.record, stage_index, outcome, Utc::now())
    }

    /// Report intra-stage progress for the current stage
    pub async fn report_progress(
        &self,
        id: &WorkflowId,
        stage_index: u32,
        fraction: f64,
    ) -> WorkflowResult<()> {
        self.apply_progress(id, stage_index, None, fraction).await
    }

    // ── Runner interface ─────────────────────────────────────────────

    pub(crate) async fn apply_progress(
        &self,
        id: &WorkflowId,
        stage_index: u32,
        attempt: Option<u32>,
        fraction: f64,
    ) -> WorkflowResult<()> {
        let handle = self.slot(id).await?;
        let mut slot = handle.write().await;
        if let Some(attempt) = attempt {
            // Reports from a stale or held stage are dropped quietly
            if !slot.is_current(attempt) || !slot.record.is_running() {
                return Ok(());
            }
        }

        let now = Utc::now();
        let moved = self
            .shared
            .tracker
            .report_progress(&mut slot.record, stage_index, fraction, now)?;
        if moved {
            debug!(
                workflow_id = %id,
                stage = stage_index,
                percent = slot.record.percent,
                "Stage progress"
            );
            self.shared.state_machine.publish(&mut slot.record, now);
        }
        Ok(())
    }

    pub(crate) async fn begin_next_stage(
        &self,
        id: &WorkflowId,
        attempt: u32,
        token: &CheckpointToken,
    ) -> RunnerStep {
        let Ok(handle) = self.slot(id).await else {
            return RunnerStep::Stop;
        };
        let mut slot = handle.write().await;
        if !slot.is_current(attempt) {
            return RunnerStep::Stop;
        }
        match slot.record.status {
            WorkflowStatus::Paused => return RunnerStep::Hold,
            WorkflowStatus::Running => {}
            _ => return RunnerStep::Stop,
        }

        let now = Utc::now();
        let Some(stage_index) = self.shared.tracker.current_stage(&slot.record) else {
            // Every stage is checkpointed but the record never completed
            if let Err(e) = self
                .shared
                .state_machine
                .apply(&mut slot.record, Operation::Complete, now)
            {
                warn!(workflow_id = %id, error = %e, "Could not complete workflow");
            }
            return RunnerStep::Stop;
        };

        if let Err(e) = self.shared.tracker.begin(&mut slot.record, stage_index, now) {
            warn!(workflow_id = %id, error = %e, "Could not begin stage");
            return RunnerStep::Stop;
        }

        let record = &slot.record;
        let stage_name = record
            .stage_at(stage_index)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        debug!(workflow_id = %id, stage = stage_index, name = %stage_name, "Stage started");

        RunnerStep::Begin(Box::new(StageContext {
            workflow_id: id.clone(),
            stage_index,
            stage_name,
            attempt,
            input: record.input.clone(),
            context: record.context.clone(),
            previous_outputs: record.stage_outputs(),
            checkpoint: token.clone(),
            progress: ProgressReporter::new(self.clone(), id.clone(), stage_index, attempt),
        }))
    }

    pub(crate) async fn apply_runner_outcome(
        &self,
        id: &WorkflowId,
        attempt: u32,
        stage_index: u32,
        outcome: StageOutcome,
    ) -> RunnerApply {
        let Ok(handle) = self.slot(id).await else {
            return RunnerApply::Stop;
        };
        let mut slot = handle.write().await;
        if !slot.is_current(attempt) {
            debug!(workflow_id = %id, attempt, "Discarding stale stage result");
            return RunnerApply::Stop;
        }
        match slot.record.status {
            WorkflowStatus::Paused => return RunnerApply::Hold,
            WorkflowStatus::Running => {}
            _ => return RunnerApply::Stop,
        }

        match self.apply_outcome(&mut slot.record, stage_index, outcome, Utc::now()) {
            Ok(StageAdvance::Advanced { .. }) => RunnerApply::Continue,
            Ok(_) => RunnerApply::Stop,
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "Stage result rejected");
                RunnerApply::Stop
            }
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    async fn slot(&self, id: &WorkflowId) -> WorkflowResult<SlotHandle> {
        self.shared
            .records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    /// Run a stage result through the tracker and settle the lifecycle
    fn apply_outcome(
        &self,
        record: &mut WorkflowRecord,
        stage_index: u32,
        outcome: StageOutcome,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StageAdvance> {
        let sm = &self.shared.state_machine;
        match self.shared.tracker.advance(record, stage_index, outcome, now) {
            Ok(advance) => {
                match &advance {
                    StageAdvance::Advanced { .. } => sm.publish(record, now),
                    StageAdvance::Finished => {
                        sm.apply(record, Operation::Complete, now)?;
                        info!(workflow_id = %record.id, "Workflow completed");
                    }
                    StageAdvance::Failed(error) => {
                        sm.fail(record, error, now)?;
                    }
                }
                Ok(advance)
            }
            Err(error @ WorkflowError::StageSequence { .. }) => {
                sm.fail(record, &error, now)?;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    fn signal_channel(&self) -> (Option<watch::Sender<RunSignal>>, Option<CheckpointToken>) {
        if self.shared.executor.is_none() {
            return (None, None);
        }
        let (tx, token) = run_signal();
        (Some(tx), Some(token))
    }

    fn spawn_runner(
        &self,
        id: WorkflowId,
        attempt: u32,
        token: CheckpointToken,
        previous: Option<JoinHandle<()>>,
    ) -> Option<JoinHandle<()>> {
        let executor = self.shared.executor.clone()?;
        let timeout = self.shared.config.stage_timeout();
        Some(tokio::spawn(runner::run(
            self.clone(),
            executor,
            id,
            attempt,
            token,
            timeout,
            previous,
        )))
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("config", &self.shared.config)
            .field("self_driving", &self.is_self_driving())
            .finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a [`WorkflowRegistry`] and its collaborators
#[derive(Default)]
pub struct WorkflowRegistryBuilder {
    config: EngineConfig,
    executor: Option<Arc<dyn StageExecutor>>,
    gate_check: Option<Arc<dyn GateCheck>>,
    store: Option<Arc<dyn WorkflowStore>>,
}

impl WorkflowRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Drive stages with `executor` instead of waiting for `report_stage`
    pub fn with_executor(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_gate_check(mut self, check: Arc<dyn GateCheck>) -> Self {
        self.gate_check = Some(check);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> WorkflowRegistry {
        let broadcaster = ProgressBroadcaster::new(self.config.event_channel_capacity);
        let gates = self
            .gate_check
            .map(QualityGateEvaluator::new)
            .unwrap_or_default();
        let tracker = StageTracker::new(gates);

        WorkflowRegistry {
            shared: Arc::new(Shared {
                records: RwLock::new(HashMap::new()),
                state_machine: WorkflowStateMachine::new(broadcaster),
                retry: RetryController::new(tracker.clone()),
                tracker,
                executor: self.executor,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryWorkflowStore::new())),
                config: self.config,
            }),
        }
    }
}
