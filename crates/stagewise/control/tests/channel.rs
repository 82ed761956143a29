//! Wire-level scenarios over the in-process control channel.

use async_trait::async_trait;
use serde_json::{json, Value};
use stagewise_control::*;
use stagewise_engine::{
    EngineConfig, StageContext, StageError, StageExecutor, SubscriptionFilter, WorkflowRegistry,
};
use stagewise_types::{stages_named, WorkflowId, WorkflowStatus};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Fails the `review` stage; completes everything else
struct RejectReview;

#[async_trait]
impl StageExecutor for RejectReview {
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        ctx.checkpoint.checkpoint().await?;
        if ctx.stage_name == "review" && ctx.attempt == 1 {
            return Err(StageError::failed("reviewer unavailable"));
        }
        Ok(json!({ "done": ctx.stage_name }))
    }
}

fn client() -> ControlClient {
    let registry = WorkflowRegistry::builder()
        .with_config(EngineConfig::default().with_default_stages(stages_named(["draft", "review", "publish"])))
        .with_executor(std::sync::Arc::new(RejectReview))
        .build();
    ControlChannel::spawn(registry, &ChannelConfig::default())
}

async fn wait_for(events: &mut EventStream, status: WorkflowStatus) -> Notification {
    tokio::time::timeout(WAIT, async {
        loop {
            let note = events.next().await.expect("stream ended");
            if note.params.overall.status == status {
                return note;
            }
        }
    })
    .await
    .expect("timed out")
}

#[tokio::test]
async fn create_fail_retry_complete_over_the_wire() {
    let client = client();
    let mut events = client.subscribe(SubscriptionFilter::All).await.unwrap();

    let created = client
        .call(json!({
            "method": "workflow.createAndStart",
            "params": { "title": "Newsletter", "description": "monthly", "input": "topics", "context": {} }
        }))
        .await
        .unwrap();
    assert_eq!(created["success"], true);
    let id = WorkflowId::new(created["data"]["workflowId"].as_str().unwrap());

    let failed = wait_for(&mut events, WorkflowStatus::Failed).await;
    assert_eq!(failed.method, "workflow.progress");
    assert_eq!(failed.params.workflow_id, id);
    assert_eq!(failed.params.error.as_deref(), Some("reviewer unavailable"));
    assert_eq!(failed.params.overall.percent, 33);

    let stages = client
        .call(json!({ "method": "workflow.getStages", "params": { "workflowId": id } }))
        .await
        .unwrap();
    assert_eq!(stages["data"][0]["status"], "completed");
    assert_eq!(stages["data"][1]["status"], "failed");

    let retried = client
        .call(json!({ "method": "workflow.retry", "params": { "workflowId": id } }))
        .await
        .unwrap();
    assert_eq!(retried, json!({ "success": true }));

    let done = wait_for(&mut events, WorkflowStatus::Completed).await;
    assert_eq!(done.params.overall.percent, 100);

    let record = client.get(&id).await.unwrap();
    assert!(record.last_error.is_none());
    assert_eq!(record.attempt, 2);
}

#[tokio::test]
async fn delete_requires_non_running_and_moves_to_history() {
    let client = client();
    // Subscribe first: the executor fails the workflow almost at once
    let mut events = client.subscribe(SubscriptionFilter::All).await.unwrap();
    let id = client
        .create_and_start(stagewise_types::CreateWorkflowRequest::new("t", json!("x")))
        .await
        .unwrap();
    wait_for(&mut events, WorkflowStatus::Failed).await;

    client.delete(&id).await.unwrap();
    assert!(client.get_all().await.unwrap().is_empty());
    let history = client.get_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, WorkflowStatus::Failed);

    let err = client.get(&id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn illegal_commands_are_rejected_without_side_effects() {
    let client = client();
    // Subscribe first: the executor fails the workflow almost at once
    let mut events = client.subscribe(SubscriptionFilter::All).await.unwrap();
    let id = client
        .create_and_start(stagewise_types::CreateWorkflowRequest::new("t", json!("x")))
        .await
        .unwrap();
    wait_for(&mut events, WorkflowStatus::Failed).await;

    let err = client.pause(&id).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
    let err = client.resume(&id).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
    assert_eq!(client.get(&id).await.unwrap().status, WorkflowStatus::Failed);

    let response = client
        .call(json!({ "method": "workflow.createAndStart", "params": { "title": "", "input": "x" } }))
        .await
        .unwrap();
    assert_eq!(response["error"]["kind"], "validation_error");
    assert_eq!(client.get_all().await.unwrap().len(), 1);
}
