//! Scenarios where an attached executor drives the stages.

use async_trait::async_trait;
use serde_json::{json, Value};
use stagewise_engine::*;
use stagewise_types::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Reports halfway progress, then echoes what it saw
struct Echo;

#[async_trait]
impl StageExecutor for Echo {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        ctx.checkpoint.checkpoint().await?;
        ctx.progress
            .report(0.5)
            .await
            .map_err(|e| StageError::failed(e.to_string()))?;
        Ok(json!({ "stage": ctx.stage_name, "previous": ctx.previous_outputs.len() }))
    }
}

/// Fails `lint` every time and `deploy` on the first attempt only
struct Flaky {
    deploy_failed: AtomicBool,
}

#[async_trait]
impl StageExecutor for Flaky {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        match ctx.stage_name.as_str() {
            "lint" => Err(StageError::failed("linter not installed")),
            "deploy" if !self.deploy_failed.swap(true, Ordering::SeqCst) => {
                Err(StageError::failed("connection reset"))
            }
            _ => Ok(json!(ctx.attempt)),
        }
    }
}

/// Announces stage 1, then waits to be released
struct Gated {
    started: mpsc::UnboundedSender<u32>,
    release: Arc<Notify>,
}

#[async_trait]
impl StageExecutor for Gated {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        if ctx.stage_index == 1 {
            let _ = self.started.send(ctx.stage_index);
            self.release.notified().await;
        }
        Ok(json!(ctx.stage_index))
    }
}

/// Never finishes on its own; honours checkpoints
struct Endless;

#[async_trait]
impl StageExecutor for Endless {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        loop {
            ctx.checkpoint.checkpoint().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct Slow;

#[async_trait]
impl StageExecutor for Slow {
    async fn execute(&self, _ctx: StageContext) -> Result<Value, StageError> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(Value::Null)
    }
}

/// Sleeps without checkpoints; counts overlapping executions
#[derive(Default)]
struct Busy {
    live: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

#[async_trait]
impl StageExecutor for Busy {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(json!(ctx.attempt))
    }
}

/// Reports `Interrupted` without any cancel being requested
struct Stray;

#[async_trait]
impl StageExecutor for Stray {
    async fn execute(&self, _ctx: StageContext) -> Result<Value, StageError> {
        Err(StageError::Interrupted)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry_with(executor: Arc<dyn StageExecutor>, stages: &[&str]) -> WorkflowRegistry {
    WorkflowRegistry::builder()
        .with_config(EngineConfig::default().with_default_stages(stages_named(stages.iter().copied())))
        .with_executor(executor)
        .build()
}

async fn wait_for_status(events: &mut ProgressSubscription, status: WorkflowStatus) -> ProgressEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if event.overall.status == status {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for status")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn executor_drives_workflow_to_completion() {
    let registry = registry_with(Arc::new(Echo), &["fetch", "transform", "load"]);
    assert!(registry.is_self_driving());
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();

    let id = registry
        .create_and_start(CreateWorkflowRequest::new("ETL", json!("orders.csv")))
        .await
        .unwrap();
    let done = wait_for_status(&mut events, WorkflowStatus::Completed).await;
    assert_eq!(done.workflow_id, id);
    assert_eq!(done.overall.percent, 100);

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.stage, 3);
    assert!(record.stages.iter().all(|s| s.status == StageStatus::Completed));
    assert_eq!(
        record.stages[2].output,
        Some(json!({ "stage": "load", "previous": 2 }))
    );
}

#[tokio::test]
async fn optional_stage_failure_is_skipped_and_retry_resumes() {
    let registry = registry_with(
        Arc::new(Flaky {
            deploy_failed: AtomicBool::new(false),
        }),
        &["build", "deploy", "verify"],
    );
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();

    let plan = vec![
        StageSpec::new("lint").optional(),
        StageSpec::new("build"),
        StageSpec::new("deploy"),
        StageSpec::new("verify"),
    ];
    let id = registry
        .create_and_start(CreateWorkflowRequest::new("Ship", json!("main")).with_stages(plan))
        .await
        .unwrap();

    let failed = wait_for_status(&mut events, WorkflowStatus::Failed).await;
    assert_eq!(failed.error.as_deref(), Some("connection reset"));
    assert_eq!(failed.overall.percent, 50);

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.stages[0].status, StageStatus::Skipped);
    assert_eq!(record.stages[2].status, StageStatus::Failed);

    let plan = registry.retry(&id).await.unwrap();
    assert_eq!(plan.resume_stage, Some(3));
    wait_for_status(&mut events, WorkflowStatus::Completed).await;

    let record = registry.get(&id).await.unwrap();
    // Build ran once, on the first attempt
    assert_eq!(record.stages[1].output, Some(json!(1)));
    assert_eq!(record.stages[2].output, Some(json!(2)));
    assert_eq!(record.attempt, 2);
}

#[tokio::test]
async fn result_arriving_while_paused_is_held_until_resume() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let registry = registry_with(
        Arc::new(Gated {
            started: started_tx,
            release: release.clone(),
        }),
        &["one", "two"],
    );
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();
    let id = registry
        .create_and_start(CreateWorkflowRequest::new("Held", json!(1)))
        .await
        .unwrap();

    tokio::time::timeout(WAIT, started_rx.recv()).await.unwrap();
    registry.pause(&id).await.unwrap();
    release.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.status, WorkflowStatus::Paused);
    assert_eq!(record.stage, 0);
    assert_eq!(record.percent, 0);

    registry.resume(&id).await.unwrap();
    wait_for_status(&mut events, WorkflowStatus::Completed).await;
    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.stage, 2);
}

#[tokio::test]
async fn cancel_interrupts_stage_at_checkpoint() {
    let registry = registry_with(Arc::new(Endless), &["forever"]);
    let id = registry
        .create_and_start(CreateWorkflowRequest::new("Endless", json!(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        registry.get_stages(&id).await.unwrap()[0].status,
        StageStatus::Running
    );

    registry.cancel(&id).await.unwrap();
    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.status, WorkflowStatus::Cancelled);
    assert_eq!(record.stages[0].status, StageStatus::Pending);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(registry.get(&id).await.unwrap().status, WorkflowStatus::Cancelled);
    registry.delete(&id).await.unwrap();
}

#[tokio::test]
async fn stage_timeout_fails_workflow() {
    let registry = WorkflowRegistry::builder()
        .with_config(EngineConfig {
            stage_timeout_ms: Some(20),
            ..EngineConfig::default().with_default_stages(stages_named(["slow"]))
        })
        .with_executor(Arc::new(Slow))
        .build();
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();
    registry
        .create_and_start(CreateWorkflowRequest::new("Slow", json!(1)))
        .await
        .unwrap();

    let failed = wait_for_status(&mut events, WorkflowStatus::Failed).await;
    assert_eq!(failed.error.as_deref(), Some("stage timed out after 20ms"));
}

#[tokio::test]
async fn retry_after_cancel_waits_for_previous_execution() {
    let busy = Arc::new(Busy::default());
    let registry = registry_with(busy.clone(), &["build"]);
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();
    let id = registry
        .create_and_start(CreateWorkflowRequest::new("Build", json!(1)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    registry.cancel(&id).await.unwrap();
    let plan = registry.retry(&id).await.unwrap();
    assert_eq!(plan.attempt, 2);

    wait_for_status(&mut events, WorkflowStatus::Completed).await;
    assert_eq!(busy.peak.load(Ordering::SeqCst), 1);
    assert_eq!(busy.runs.load(Ordering::SeqCst), 2);

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.attempt, 2);
    assert_eq!(record.stages[0].output, Some(json!(2)));
}

#[tokio::test]
async fn uncancelled_interrupt_fails_workflow() {
    let registry = registry_with(Arc::new(Stray), &["fetch", "load"]);
    let mut events = registry.subscribe(SubscriptionFilter::All).await.unwrap();
    let id = registry
        .create_and_start(CreateWorkflowRequest::new("Stray", json!(1)))
        .await
        .unwrap();

    let failed = wait_for_status(&mut events, WorkflowStatus::Failed).await;
    assert_eq!(failed.workflow_id, id);
    assert_eq!(failed.error.as_deref(), Some("stage interrupted"));

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.status, WorkflowStatus::Failed);
    assert_ne!(record.stages[0].status, StageStatus::Running);
    assert!(record.last_error.is_some());
}
