//! Workflow Domain Types for Stagewise
//!
//! A workflow is a long-running execution instance composed of an
//! ordered, fixed list of stages. Each stage may carry quality gates
//! that must pass before the next stage is allowed to start.
//!
//! # Key Concepts
//!
//! - **WorkflowRecord**: immutable identity plus the mutable execution
//!   state of one workflow instance.
//! - **Stage**: one unit of work, tracked for completion independently.
//! - **QualityGate**: a pass/fail checkpoint attached to a stage.
//! - **ProgressEvent**: an immutable snapshot emitted on every change.
//! - **StageSpec / GateSpec**: the blueprint a workflow is created from.
//!
//! These types carry no behavior beyond invariant-preserving helpers;
//! the lifecycle rules live in `stagewise-engine`.

#![deny(unsafe_code)]

mod blueprint;
mod errors;
mod event;
mod ids;
mod record;
mod status;

pub use blueprint::*;
pub use errors::*;
pub use event::*;
pub use ids::*;
pub use record::*;
pub use status::*;
