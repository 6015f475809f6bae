//! tally-reconcile
//!
//! Duplicate suppression and session reconciliation.
//!
//! - Punches within the duplicate tolerance of a recorded punch are dropped
//! - Label-driven (webhook) and shift-driven (bulk) classification share one
//!   session state machine
//! - At most one open session per employee
//! - A closed session is never reopened
//!
//! Deterministic, pure logic. No IO. Callers load an [`EmployeeLedger`],
//! ask the [`Reconciler`] for an [`Outcome`], and persist its changes.

mod engine;
mod suppressor;
mod types;

pub use engine::Reconciler;
pub use suppressor::{is_duplicate, DuplicateTolerance};
pub use types::*;
