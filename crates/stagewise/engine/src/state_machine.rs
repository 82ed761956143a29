//! State machine: owns workflow lifecycle transitions
//!
//! The transition table is a total function over `(status, operation)`.
//! Anything not listed is `InvalidTransition` and leaves the record
//! untouched. Every successful transition publishes a progress event.

use crate::broadcaster::ProgressBroadcaster;
use chrono::{DateTime, Utc};
use stagewise_types::*;

/// The lifecycle transition table.
///
/// ```text
/// idle      --start-->    running
/// running   --pause-->    paused
/// paused    --resume-->   running
/// running   --complete--> completed
/// running   --fail-->     failed
/// running   --cancel-->   cancelled
/// paused    --cancel-->   cancelled
/// failed    --retry-->    running
/// cancelled --retry-->    running
/// ```
pub fn transition(status: WorkflowStatus, operation: Operation) -> WorkflowResult<WorkflowStatus> {
    use Operation as Op;
    use WorkflowStatus as S;

    let next = match (status, operation) {
        (S::Idle, Op::Start) => S::Running,
        (S::Running, Op::Pause) => S::Paused,
        (S::Paused, Op::Resume) => S::Running,
        (S::Running, Op::Complete) => S::Completed,
        (S::Running, Op::Fail) => S::Failed,
        (S::Running | S::Paused, Op::Cancel) => S::Cancelled,
        (S::Failed | S::Cancelled, Op::Retry) => S::Running,
        _ => return Err(WorkflowError::InvalidTransition { status, operation }),
    };
    Ok(next)
}

/// Applies lifecycle transitions to records and announces them
#[derive(Clone, Debug)]
pub struct WorkflowStateMachine {
    broadcaster: ProgressBroadcaster,
}

impl WorkflowStateMachine {
    pub fn new(broadcaster: ProgressBroadcaster) -> Self {
        Self { broadcaster }
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Apply `operation` to the record.
    ///
    /// Validates first; on error nothing on the record changes.
    pub fn apply(
        &self,
        record: &mut WorkflowRecord,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowStatus> {
        let previous = record.status;
        let next = transition(previous, operation)?;

        match operation {
            Operation::Start => {
                record.started_at.get_or_insert(now);
                record.open_running_interval(now);
            }
            Operation::Resume => record.open_running_interval(now),
            Operation::Pause => record.close_running_interval(now),
            Operation::Complete | Operation::Fail | Operation::Cancel => {
                record.close_running_interval(now);
                record.completed_at = Some(now);
            }
            Operation::Retry => {
                record.completed_at = None;
                record.open_running_interval(now);
            }
        }

        record.status = next;
        record.updated_at = now;

        tracing::info!(
            workflow_id = %record.id,
            from = %previous,
            to = %next,
            stage = record.stage,
            percent = record.percent,
            "Workflow transitioned"
        );

        self.publish(record, now);
        Ok(next)
    }

    /// Capture an execution-time error and transition to `failed`
    pub fn fail(
        &self,
        record: &mut WorkflowRecord,
        error: &WorkflowError,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowStatus> {
        transition(record.status, Operation::Fail)?;
        record.last_error = Some(error.last_error_text());
        tracing::warn!(
            workflow_id = %record.id,
            kind = error.kind(),
            error = %error,
            "Workflow failed"
        );
        self.apply(record, Operation::Fail, now)
    }

    /// Publish the record's current progress without a status change
    pub fn publish(&self, record: &mut WorkflowRecord, now: DateTime<Utc>) {
        record.event_sequence += 1;
        let error = if record.status == WorkflowStatus::Failed {
            record.last_error.clone()
        } else {
            None
        };
        self.broadcaster.publish(ProgressEvent {
            workflow_id: record.id.clone(),
            sequence: record.event_sequence,
            overall: record.progress(now),
            error,
            emitted_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::SubscriptionFilter;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn record() -> WorkflowRecord {
        WorkflowRecord::new(
            "Report",
            "",
            json!("input"),
            Value::Null,
            &stages_named(["a", "b", "c"]),
            Utc::now(),
        )
    }

    fn machine() -> WorkflowStateMachine {
        WorkflowStateMachine::new(ProgressBroadcaster::new(16))
    }

    #[test]
    fn test_transition_table_is_total() {
        let legal = [
            (WorkflowStatus::Idle, Operation::Start),
            (WorkflowStatus::Running, Operation::Pause),
            (WorkflowStatus::Paused, Operation::Resume),
            (WorkflowStatus::Running, Operation::Complete),
            (WorkflowStatus::Running, Operation::Fail),
            (WorkflowStatus::Running, Operation::Cancel),
            (WorkflowStatus::Paused, Operation::Cancel),
            (WorkflowStatus::Failed, Operation::Retry),
            (WorkflowStatus::Cancelled, Operation::Retry),
        ];
        for status in WorkflowStatus::ALL {
            for op in Operation::ALL {
                let result = transition(status, op);
                assert_eq!(
                    result.is_ok(),
                    legal.contains(&(status, op)),
                    "({status}, {op})"
                );
            }
        }
    }

    #[test]
    fn test_pause_only_legal_while_running() {
        for status in WorkflowStatus::ALL {
            if status == WorkflowStatus::Running {
                continue;
            }
            let err = transition(status, Operation::Pause).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_illegal_apply_leaves_record_unchanged() {
        let sm = machine();
        let mut rec = record();
        let before = rec.clone();
        assert!(sm.apply(&mut rec, Operation::Pause, Utc::now()).is_err());
        assert_eq!(rec, before);
    }

    #[test]
    fn test_pause_excludes_elapsed_time() {
        let sm = machine();
        let mut rec = record();
        let t0 = Utc::now();
        sm.apply(&mut rec, Operation::Start, t0).unwrap();
        sm.apply(&mut rec, Operation::Pause, t0 + Duration::seconds(120))
            .unwrap();
        assert_eq!(rec.elapsed_ms, 120_000);

        // Five seconds of wall-clock pause
        let resumed_at = t0 + Duration::seconds(125);
        sm.apply(&mut rec, Operation::Resume, resumed_at).unwrap();
        assert_eq!(rec.elapsed_ms_at(resumed_at), 120_000);
        assert_eq!(
            rec.elapsed_ms_at(resumed_at + Duration::seconds(1)),
            121_000
        );
    }

    #[test]
    fn test_cancel_freezes_elapsed_time() {
        let sm = machine();
        let mut rec = record();
        let t0 = Utc::now();
        sm.apply(&mut rec, Operation::Start, t0).unwrap();
        sm.apply(&mut rec, Operation::Cancel, t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(rec.elapsed_ms_at(t0 + Duration::hours(1)), 3_000);
        assert_eq!(rec.completed_at, Some(t0 + Duration::seconds(3)));
    }

    #[test]
    fn test_fail_records_last_error_and_event() {
        let sm = machine();
        let mut sub = sm.broadcaster().subscribe_all();
        let mut rec = record();
        sm.apply(&mut rec, Operation::Start, Utc::now()).unwrap();
        sm.fail(
            &mut rec,
            &WorkflowError::Execution("disk full".into()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(rec.status, WorkflowStatus::Failed);
        assert_eq!(rec.last_error.as_deref(), Some("disk full"));

        let started = sub.try_recv().unwrap();
        assert_eq!(started.overall.status, WorkflowStatus::Running);
        assert_eq!(started.sequence, 1);
        let failed = sub.try_recv().unwrap();
        assert_eq!(failed.overall.status, WorkflowStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("disk full"));
        assert_eq!(failed.sequence, 2);
    }

    #[test]
    fn test_fail_rejected_when_not_running() {
        let sm = machine();
        let mut rec = record();
        let err = sm
            .fail(&mut rec, &WorkflowError::Execution("x".into()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert!(rec.last_error.is_none());
    }

    #[test]
    fn test_events_reach_workflow_subscribers() {
        let sm = machine();
        let mut rec = record();
        sm.broadcaster().open(&rec.id);
        let mut sub = sm
            .broadcaster()
            .subscribe(&SubscriptionFilter::Workflow(rec.id.clone()))
            .unwrap();
        sm.apply(&mut rec, Operation::Start, Utc::now()).unwrap();
        assert_eq!(sub.try_recv().unwrap().workflow_id, rec.id);
    }
}
