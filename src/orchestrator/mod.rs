//! Application-level orchestration utilities.
//!
//! This module owns the interactive session loop (command handling, compression lifecycle)
//! and post-compression processing such as saving and exports. UI/CLI layers call into
//! this module to keep responsibilities separated.

mod post_process;
mod session;

pub use post_process::{process_completion, ProcessedResult};
pub use session::{run_session, SessionCommand, SessionOptions, SessionOutcome};
