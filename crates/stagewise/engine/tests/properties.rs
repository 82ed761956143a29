//! Property tests for lifecycle and progress invariants.

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};
use stagewise_engine::*;
use stagewise_types::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_status() -> impl Strategy<Value = WorkflowStatus> {
    prop::sample::select(WorkflowStatus::ALL.to_vec())
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

/// A stage report: which index, whether it succeeded, and how far along
/// the stage claims to be beforehand
fn arb_report() -> impl Strategy<Value = (u32, bool, f64)> {
    (0u32..10, prop::bool::weighted(0.9), 0.0f64..1.5)
}

fn running_record(total: usize, sm: &WorkflowStateMachine) -> WorkflowRecord {
    let names: Vec<String> = (0..total).map(|i| format!("stage-{i}")).collect();
    let now = Utc::now();
    let mut record = WorkflowRecord::new("p", "", json!("in"), Value::Null, &stages_named(names), now);
    sm.apply(&mut record, Operation::Start, now).unwrap();
    record
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Percent stays within [0, 100] and never drops while running.
    #[test]
    fn percent_is_bounded_and_monotonic(
        total in 1usize..9,
        reports in prop::collection::vec(arb_report(), 0..40),
    ) {
        let sm = WorkflowStateMachine::new(ProgressBroadcaster::new(8));
        let tracker = StageTracker::default();
        let mut record = running_record(total, &sm);
        let mut last = record.percent;

        for (stage, succeeded, fraction) in reports {
            if !record.is_running() {
                break;
            }
            let now = Utc::now();
            let _ = tracker.report_progress(&mut record, stage, fraction, now);
            prop_assert!(record.percent <= 100);
            prop_assert!(record.percent >= last);
            last = record.percent;

            let outcome = if succeeded {
                StageOutcome::Completed(json!(stage))
            } else {
                StageOutcome::Failed("boom".into())
            };
            match tracker.advance(&mut record, stage, outcome, now) {
                Ok(StageAdvance::Finished) => {
                    prop_assert_eq!(record.percent, 100);
                    sm.apply(&mut record, Operation::Complete, now).unwrap();
                }
                Ok(StageAdvance::Failed(err)) => {
                    sm.fail(&mut record, &err, now).unwrap();
                }
                Ok(StageAdvance::Advanced { next_stage }) => {
                    prop_assert_eq!(next_stage, record.stage + 1);
                }
                Err(WorkflowError::StageSequence { expected, actual }) => {
                    prop_assert_ne!(expected, actual);
                    prop_assert_eq!(record.percent, last);
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
            prop_assert!(record.percent <= 100);
            prop_assert!(record.percent >= last);
            prop_assert!(record.stage <= record.total_stages);
            last = record.percent;
        }
    }

    /// An illegal (status, operation) pair never mutates the record.
    #[test]
    fn illegal_transitions_never_mutate(status in arb_status(), operation in arb_operation()) {
        let sm = WorkflowStateMachine::new(ProgressBroadcaster::new(8));
        let mut record = running_record(3, &sm);
        record.status = status;
        let before = record.clone();

        let allowed = transition(status, operation);
        let applied = sm.apply(&mut record, operation, Utc::now());
        prop_assert_eq!(allowed.is_ok(), applied.is_ok());
        if let Err(err) = applied {
            prop_assert_eq!(err.kind(), "invalid_transition");
            prop_assert_eq!(record, before);
        } else {
            prop_assert_eq!(Some(record.status), allowed.ok());
        }
    }

    /// Terminal states only leave through retry.
    #[test]
    fn terminal_states_only_accept_retry(operation in arb_operation()) {
        for status in [WorkflowStatus::Completed, WorkflowStatus::Failed, WorkflowStatus::Cancelled] {
            let result = transition(status, operation);
            if operation == Operation::Retry && status != WorkflowStatus::Completed {
                prop_assert_eq!(result, Ok(WorkflowStatus::Running));
            } else {
                prop_assert!(result.is_err());
            }
        }
    }
}
