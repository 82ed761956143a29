//! Cooperative pause/cancel signalling for running stages
//!
//! Stage code calls [`CheckpointToken::checkpoint`] at safe points. A
//! pause request parks the caller until resumed; a cancel request makes
//! the checkpoint return `StageError::Interrupted`.

use crate::executor::StageError;
use tokio::sync::watch;

/// What the registry currently asks of a workflow's runner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunSignal {
    Run,
    Pause,
    Cancel,
}

/// Create the signal channel for one execution generation
pub fn run_signal() -> (watch::Sender<RunSignal>, CheckpointToken) {
    let (tx, rx) = watch::channel(RunSignal::Run);
    (tx, CheckpointToken { rx })
}

/// Receiving half of a run signal
#[derive(Clone, Debug)]
pub struct CheckpointToken {
    rx: watch::Receiver<RunSignal>,
}

impl CheckpointToken {
    pub fn signal(&self) -> RunSignal {
        *self.rx.borrow()
    }

    /// Cancelled explicitly, or the registry dropped the sender
    pub fn is_cancelled(&self) -> bool {
        self.signal() == RunSignal::Cancel || self.rx.has_changed().is_err()
    }

    pub fn pause_requested(&self) -> bool {
        self.signal() == RunSignal::Pause
    }

    /// Wait while paused; fail with `Interrupted` once cancelled.
    ///
    /// A dropped sender counts as cancellation.
    pub async fn checkpoint(&self) -> Result<(), StageError> {
        let mut rx = self.rx.clone();
        loop {
            let signal = *rx.borrow_and_update();
            match signal {
                RunSignal::Run => return Ok(()),
                RunSignal::Cancel => return Err(StageError::Interrupted),
                RunSignal::Pause => {
                    if rx.changed().await.is_err() {
                        return Err(StageError::Interrupted);
                    }
                }
            }
        }
    }
}
