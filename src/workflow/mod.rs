//! The compression workflow state machine.
//!
//! `WorkflowController` owns the single live `WorkflowState`, the table of revocable
//! artifact references and the session's history ledger.

mod controller;
mod state;

pub use controller::{CompressJob, SessionSummary, WorkflowController};
pub use state::WorkflowState;
