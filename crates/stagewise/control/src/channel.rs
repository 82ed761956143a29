//! In-process command/event channel
//!
//! Commands are queued on an mpsc channel and answered over a oneshot.
//! Each command is dispatched on its own task; operations on the same
//! workflow are still serialized by the registry's per-record lock.

use crate::commands::{Command, CommandResponse, Notification};
use crate::config::ChannelConfig;
use crate::dispatcher::dispatch;
use crate::error::{ControlError, ControlResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stagewise_engine::{ProgressSubscription, SubscriptionFilter, WorkflowRegistry};
use stagewise_types::{CreateWorkflowRequest, QualityGate, Stage, WorkflowId, WorkflowRecord, WorkflowSummary};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

struct Request {
    command: Command,
    reply: oneshot::Sender<CommandResponse>,
}

/// Serving side of the control channel
pub struct ControlChannel;

impl ControlChannel {
    /// Start serving `registry` and return a client for it.
    ///
    /// The server stops once every client clone has been dropped.
    pub fn spawn(registry: WorkflowRegistry, config: &ChannelConfig) -> ControlClient {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        tokio::spawn(serve(registry.clone(), rx));
        info!(buffer = config.command_buffer, "Control channel started");
        ControlClient { tx, registry }
    }
}

async fn serve(registry: WorkflowRegistry, mut rx: mpsc::Receiver<Request>) {
    while let Some(request) = rx.recv().await {
        let registry = registry.clone();
        tokio::spawn(async move {
            let response = dispatch(&registry, request.command).await;
            // The caller may have given up waiting
            let _ = request.reply.send(response);
        });
    }
    debug!("Control channel stopped");
}

/// Client half of the control channel
#[derive(Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<Request>,
    registry: WorkflowRegistry,
}

impl ControlClient {
    /// Send a command and wait for its response
    pub async fn send(&self, command: Command) -> ControlResult<CommandResponse> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| ControlError::ChannelClosed)?;
        response.await.map_err(|_| ControlError::ChannelClosed)
    }

    /// Wire-level call: a JSON command in, a JSON response out.
    ///
    /// Malformed commands are answered with an `invalid_command` failure.
    pub async fn call(&self, message: Value) -> ControlResult<Value> {
        let response = match serde_json::from_value::<Command>(message) {
            Ok(command) => self.send(command).await?,
            Err(e) => CommandResponse::failed("invalid_command", e.to_string()),
        };
        Ok(serde_json::to_value(response)?)
    }

    // ── Typed commands ───────────────────────────────────────────────

    pub async fn get_all(&self) -> ControlResult<Vec<WorkflowSummary>> {
        self.request(Command::GetAll).await
    }

    pub async fn create_and_start(&self, request: CreateWorkflowRequest) -> ControlResult<WorkflowId> {
        let data: Value = self.request(Command::CreateAndStart(request)).await?;
        let id = data
            .get("workflowId")
            .cloned()
            .ok_or_else(|| ControlError::Payload("response is missing workflowId".to_string()))?;
        Ok(serde_json::from_value(id)?)
    }

    pub async fn pause(&self, id: &WorkflowId) -> ControlResult<()> {
        self.execute(Command::Pause(id.clone().into())).await
    }

    pub async fn resume(&self, id: &WorkflowId) -> ControlResult<()> {
        self.execute(Command::Resume(id.clone().into())).await
    }

    pub async fn retry(&self, id: &WorkflowId) -> ControlResult<()> {
        self.execute(Command::Retry(id.clone().into())).await
    }

    pub async fn cancel(&self, id: &WorkflowId) -> ControlResult<()> {
        self.execute(Command::Cancel(id.clone().into())).await
    }

    pub async fn delete(&self, id: &WorkflowId) -> ControlResult<()> {
        self.execute(Command::Delete(id.clone().into())).await
    }

    pub async fn get(&self, id: &WorkflowId) -> ControlResult<WorkflowRecord> {
        self.request(Command::Get(id.clone().into())).await
    }

    pub async fn get_stages(&self, id: &WorkflowId) -> ControlResult<Vec<Stage>> {
        self.request(Command::GetStages(id.clone().into())).await
    }

    pub async fn get_gates(&self, id: &WorkflowId) -> ControlResult<Vec<QualityGate>> {
        self.request(Command::GetGates(id.clone().into())).await
    }

    pub async fn get_history(&self) -> ControlResult<Vec<WorkflowSummary>> {
        self.request(Command::GetHistory).await
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Follow `workflow.progress` notifications
    pub async fn subscribe(&self, filter: SubscriptionFilter) -> ControlResult<EventStream> {
        let subscription = self.registry.subscribe(filter).await?;
        Ok(EventStream { subscription })
    }

    // ── Internal helpers ─────────────────────────────────────────────

    async fn request<T: DeserializeOwned>(&self, command: Command) -> ControlResult<T> {
        let response = self.send(command).await?;
        let data = Self::accept(response)?.unwrap_or(Value::Null);
        Ok(serde_json::from_value(data)?)
    }

    async fn execute(&self, command: Command) -> ControlResult<()> {
        let response = self.send(command).await?;
        Self::accept(response).map(|_| ())
    }

    fn accept(response: CommandResponse) -> ControlResult<Option<Value>> {
        if response.success {
            return Ok(response.data);
        }
        let (kind, message) = response
            .error
            .map(|e| (e.kind, e.message))
            .unwrap_or_else(|| ("unknown".to_string(), "command failed".to_string()));
        Err(ControlError::Rejected { kind, message })
    }
}

/// Stream of `workflow.progress` notifications
#[derive(Debug)]
pub struct EventStream {
    subscription: ProgressSubscription,
}

impl EventStream {
    /// Next notification; `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Notification> {
        self.subscription.recv().await.map(Notification::progress)
    }
}
