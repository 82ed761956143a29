//! Maps commands onto registry calls

use crate::commands::{Command, CommandResponse};
use serde::Serialize;
use serde_json::json;
use stagewise_engine::WorkflowRegistry;
use stagewise_types::WorkflowResult;
use tracing::{debug, warn};

/// Execute one command against the registry.
///
/// Never fails: engine errors become `success: false` responses.
pub async fn dispatch(registry: &WorkflowRegistry, command: Command) -> CommandResponse {
    let method = command.method();
    debug!(method, workflow_id = ?command.workflow_id(), "Dispatching command");

    let response = match command {
        Command::GetAll => respond(Ok(registry.list().await)),
        Command::CreateAndStart(request) => respond(
            registry
                .create_and_start(request)
                .await
                .map(|id| json!({ "workflowId": id })),
        ),
        Command::Pause(r) => done(registry.pause(&r.workflow_id).await),
        Command::Resume(r) => done(registry.resume(&r.workflow_id).await),
        Command::Retry(r) => done(registry.retry(&r.workflow_id).await.map(|_| ())),
        Command::Cancel(r) => done(registry.cancel(&r.workflow_id).await),
        Command::Delete(r) => done(registry.delete(&r.workflow_id).await),
        Command::Get(r) => respond(registry.get(&r.workflow_id).await),
        Command::GetStages(r) => respond(registry.get_stages(&r.workflow_id).await),
        Command::GetGates(r) => respond(registry.get_gates(&r.workflow_id).await),
        Command::GetHistory => respond(registry.history().await),
    };

    if let Some(error) = &response.error {
        warn!(method, kind = %error.kind, error = %error.message, "Command failed");
    }
    response
}

fn respond<T: Serialize>(result: WorkflowResult<T>) -> CommandResponse {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => CommandResponse::ok(value),
            Err(e) => CommandResponse::failed("internal_error", e.to_string()),
        },
        Err(e) => CommandResponse::from(&e),
    }
}

fn done(result: WorkflowResult<()>) -> CommandResponse {
    match result {
        Ok(()) => CommandResponse::done(),
        Err(e) => CommandResponse::from(&e),
    }
}
