//! Progress broadcasting to any number of observers
//!
//! One global channel carries every event; each workflow additionally
//! has its own channel so observers can follow a single workflow.
//! Publishing never blocks and never fails the caller: with no
//! subscribers the event is simply dropped, and a subscriber that falls
//! behind loses the oldest events instead of stalling the publisher.

use stagewise_types::{ProgressEvent, WorkflowId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

type ChannelMap = HashMap<WorkflowId, broadcast::Sender<ProgressEvent>>;

/// Which events a subscription receives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    Workflow(WorkflowId),
}

/// Fan-out of progress events
#[derive(Clone, Debug)]
pub struct ProgressBroadcaster {
    capacity: usize,
    global_tx: broadcast::Sender<ProgressEvent>,
    per_workflow: Arc<RwLock<ChannelMap>>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global_tx, _) = broadcast::channel(capacity);
        Self {
            capacity,
            global_tx,
            per_workflow: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open the per-workflow channel
    pub fn open(&self, workflow_id: &WorkflowId) {
        self.channels_mut()
            .entry(workflow_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Close the per-workflow channel; its subscribers see end-of-stream
    /// once they have drained what was already sent.
    pub fn close(&self, workflow_id: &WorkflowId) {
        if self.channels_mut().remove(workflow_id).is_some() {
            debug!(workflow_id = %workflow_id, "Progress channel closed");
        }
    }

    pub fn subscribe_all(&self) -> ProgressSubscription {
        ProgressSubscription {
            filter: SubscriptionFilter::All,
            rx: self.global_tx.subscribe(),
        }
    }

    /// Subscribe; `None` when the workflow has no open channel
    pub fn subscribe(&self, filter: &SubscriptionFilter) -> Option<ProgressSubscription> {
        match filter {
            SubscriptionFilter::All => Some(self.subscribe_all()),
            SubscriptionFilter::Workflow(id) => {
                let rx = self.channels().get(id)?.subscribe();
                Some(ProgressSubscription {
                    filter: filter.clone(),
                    rx,
                })
            }
        }
    }

    pub fn publish(&self, event: ProgressEvent) {
        debug!(
            workflow_id = %event.workflow_id,
            sequence = event.sequence,
            status = %event.overall.status,
            percent = event.overall.percent,
            "Publishing progress event"
        );
        if let Some(tx) = self.channels().get(&event.workflow_id) {
            // No subscribers is fine
            let _ = tx.send(event.clone());
        }
        let _ = self.global_tx.send(event);
    }

    /// Subscribers of the global stream plus every per-workflow stream
    pub fn subscriber_count(&self) -> usize {
        self.global_tx.receiver_count()
            + self
                .channels()
                .values()
                .map(|tx| tx.receiver_count())
                .sum::<usize>()
    }

    pub fn is_open(&self, workflow_id: &WorkflowId) -> bool {
        self.channels().contains_key(workflow_id)
    }

    fn channels(&self) -> RwLockReadGuard<'_, ChannelMap> {
        self.per_workflow
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn channels_mut(&self) -> RwLockWriteGuard<'_, ChannelMap> {
        self.per_workflow
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A stream of progress events, FIFO per workflow
#[derive(Debug)]
pub struct ProgressSubscription {
    filter: SubscriptionFilter,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl ProgressSubscription {
    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Next event; `None` once the stream is closed
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        filter = ?self.filter,
                        missed,
                        "Progress subscriber lagged behind"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event, without waiting
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(
                        filter = ?self.filter,
                        missed,
                        "Progress subscriber lagged behind"
                    );
                }
                Err(_) => return None,
            }
        }
    }
}
