//! Single-image compression workflow.
//!
//! A `WorkflowController` walks one image through upload, configuration, compression and
//! result, handing each finished result to a `HistoryLedger` that keeps it downloadable for
//! the rest of the session. Pixel work is delegated to a pluggable `Transcoder`.

pub mod engine;
pub mod error;
pub mod export;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod references;
pub mod text_summary;
pub mod workflow;

pub use engine::{CompressionEngine, RasterTranscoder, Transcoder};
pub use error::WorkflowError;
pub use ledger::HistoryLedger;
pub use workflow::{WorkflowController, WorkflowState};
