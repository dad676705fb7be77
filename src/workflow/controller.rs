//! Upload → configure → compress → result → reset.
//!
//! The controller owns the live state, the reference table and the history ledger. Every
//! reference it creates is either revoked by the controller (previews) or handed to the
//! ledger (results); `release` is the single place where that decision is made.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use super::state::WorkflowState;
use crate::engine::{CompressionEngine, TranscodeOptions};
use crate::error::{InvalidInputReason, Result, WorkflowError};
use crate::ledger::HistoryLedger;
use crate::metrics;
use crate::model::{
    download_name, mb_to_bytes, CompressConfig, CompressEvent, DownloadPayload, FileInput,
    HistoryRecord, ImageArtifact, ImageMime, RecordId, StateKind, MAX_TARGET_MB, MIN_TARGET_MB,
};
use crate::references::{ArtifactRef, ReferenceTable};

/// Everything the transcoder needs for one run, captured when compression begins.
#[derive(Debug, Clone)]
pub struct CompressJob {
    pub input: Arc<ImageArtifact>,
    pub options: TranscodeOptions,
}

/// Reference accounting at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub records: usize,
    pub references_created: u64,
    pub references_revoked: u64,
    pub references_leaked: usize,
    pub double_revocations: u64,
}

pub struct WorkflowController {
    state: WorkflowState,
    target_mb: f64,
    max_dimension_px: u32,
    last_error: Option<WorkflowError>,
    refs: ReferenceTable,
    ledger: HistoryLedger,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

fn validate(mut files: Vec<FileInput>) -> std::result::Result<(FileInput, ImageMime), InvalidInputReason> {
    let file = match files.len() {
        0 => return Err(InvalidInputReason::NoFile),
        1 => files.remove(0),
        n => return Err(InvalidInputReason::TooManyFiles(n)),
    };
    if file.declared_type.trim().is_empty() {
        return Err(InvalidInputReason::UndeclaredType);
    }
    let mime = ImageMime::parse(&file.declared_type)
        .ok_or_else(|| InvalidInputReason::UnsupportedType(file.declared_type.clone()))?;
    if file.bytes.is_empty() {
        return Err(InvalidInputReason::EmptyFile);
    }
    Ok((file, mime))
}

impl WorkflowController {
    pub fn new(config: &CompressConfig) -> Self {
        Self {
            state: WorkflowState::Idle,
            target_mb: clamp_target(config.target_mb).unwrap_or(crate::model::DEFAULT_TARGET_MB),
            max_dimension_px: config.max_dimension_px,
            last_error: None,
            refs: ReferenceTable::new(),
            ledger: HistoryLedger::new(),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn last_error(&self) -> Option<&WorkflowError> {
        self.last_error.as_ref()
    }

    pub fn target_mb(&self) -> f64 {
        self.target_mb
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.refs
    }

    pub fn resolve(&self, reference: &ArtifactRef) -> Option<Arc<ImageArtifact>> {
        self.refs.resolve(reference)
    }

    fn invalid_state(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidState {
            action,
            state: self.state.kind(),
        }
    }

    /// Revoke `reference` unless a history record owns it.
    fn release(&mut self, reference: &ArtifactRef) {
        if self.ledger.reference_is_owned(reference) {
            debug!(
                reference = reference.as_str(),
                "reference owned by history, not revoking"
            );
            return;
        }
        self.refs.revoke(reference);
    }

    /// Release the references held by a state that is being left behind.
    fn release_state(&mut self, prior: WorkflowState) {
        match prior {
            WorkflowState::Idle => {}
            WorkflowState::Loaded { preview, .. } | WorkflowState::Compressing { preview, .. } => {
                self.release(&preview);
            }
            WorkflowState::Result {
                preview, result_ref, ..
            } => {
                self.release(&preview);
                self.release(&result_ref);
            }
        }
    }

    /// Accept a selection of files. Exactly one supported image is required.
    pub fn submit(&mut self, files: Vec<FileInput>) -> Result<ArtifactRef> {
        if self.state.kind() == StateKind::Compressing {
            return Err(self.invalid_state("submit"));
        }

        let (file, mime) = match validate(files) {
            Ok(v) => v,
            Err(reason) => {
                warn!(%reason, "rejected submission");
                let err = WorkflowError::InvalidInput(reason);
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let original = Arc::new(ImageArtifact::new(file.bytes, mime, file.name));
        let prior = std::mem::take(&mut self.state);
        self.release_state(prior);

        let preview = self.refs.create(original.clone());
        info!(
            name = original.original_file_name(),
            size_bytes = original.size_bytes(),
            %mime,
            "image loaded"
        );
        self.state = WorkflowState::Loaded {
            original,
            preview: preview.clone(),
        };
        self.last_error = None;
        Ok(preview)
    }

    /// Store the target for the next compression. Returns the value actually stored.
    pub fn set_target(&mut self, mb: f64) -> f64 {
        if let Some(clamped) = clamp_target(mb) {
            self.target_mb = clamped;
        }
        self.target_mb
    }

    /// Loaded → Compressing.
    pub fn begin_compress(&mut self) -> Result<CompressJob> {
        match std::mem::take(&mut self.state) {
            WorkflowState::Loaded { original, preview } => {
                let job = CompressJob {
                    input: original.clone(),
                    options: TranscodeOptions {
                        max_size_bytes: mb_to_bytes(self.target_mb),
                        max_dimension_px: self.max_dimension_px,
                    },
                };
                info!(
                    name = original.original_file_name(),
                    max_size_bytes = job.options.max_size_bytes,
                    "compression started"
                );
                self.state = WorkflowState::Compressing {
                    original,
                    preview,
                    progress: 0,
                };
                self.last_error = None;
                Ok(job)
            }
            other => {
                self.state = other;
                Err(self.invalid_state("compress"))
            }
        }
    }

    /// Fold a progress notification into the state. Progress never goes backwards.
    pub fn record_progress(&mut self, percent: u8) -> Result<u8> {
        match &mut self.state {
            WorkflowState::Compressing { progress, .. } => {
                *progress = (*progress).max(percent.min(100));
                Ok(*progress)
            }
            _ => Err(self.invalid_state("report progress")),
        }
    }

    /// Compressing → Result on success (appending a history record), → Loaded on failure.
    pub fn finish_compress(
        &mut self,
        outcome: std::result::Result<ImageArtifact, WorkflowError>,
    ) -> Result<HistoryRecord> {
        let (original, preview) = match std::mem::take(&mut self.state) {
            WorkflowState::Compressing {
                original, preview, ..
            } => (original, preview),
            other => {
                self.state = other;
                return Err(self.invalid_state("finish compression"));
            }
        };

        let compressed = match outcome {
            Ok(artifact) => artifact,
            Err(e) => {
                let err = match e {
                    WorkflowError::CompressionFailed(_) => e,
                    other => WorkflowError::CompressionFailed(other.to_string()),
                };
                warn!(error = %err, "compression failed, back to loaded");
                self.state = WorkflowState::Loaded { original, preview };
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let result = Arc::new(compressed);
        let result_ref = self.refs.create(result.clone());
        let record = HistoryRecord {
            id: self.ledger.next_id(),
            original_file_name: original.original_file_name().to_string(),
            original_size_bytes: original.size_bytes(),
            compressed_size_bytes: result.size_bytes(),
            savings_percent: metrics::savings_percent(original.size_bytes(), result.size_bytes()),
            mime: result.mime(),
            artifact_reference: result_ref.clone(),
            created_at: now_rfc3339(),
        };
        self.ledger.append(record.clone());
        info!(
            id = record.id.0,
            original_size_bytes = record.original_size_bytes,
            compressed_size_bytes = record.compressed_size_bytes,
            savings_percent = record.savings_percent,
            "compression finished"
        );

        self.state = WorkflowState::Result {
            original,
            preview,
            result,
            result_ref,
            record_id: record.id,
        };
        self.last_error = None;
        Ok(record)
    }

    /// Run a whole compression, republishing progress into the state and onto `event_tx`.
    pub async fn compress(
        &mut self,
        engine: &CompressionEngine,
        event_tx: UnboundedSender<CompressEvent>,
    ) -> Result<HistoryRecord> {
        let job = self.begin_compress()?;
        let _ = event_tx.send(CompressEvent::StateChanged {
            state: StateKind::Compressing,
        });

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let run = engine.run(job.input, job.options, progress_tx);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                out = &mut run => break out,
                Some(ev) = progress_rx.recv() => self.forward(ev, &event_tx),
            }
        };
        while let Ok(ev) = progress_rx.try_recv() {
            self.forward(ev, &event_tx);
        }

        let finished = self.finish_compress(outcome);
        let _ = event_tx.send(CompressEvent::StateChanged {
            state: self.state.kind(),
        });
        match &finished {
            Ok(record) => {
                let _ = event_tx.send(CompressEvent::Completed {
                    record: Box::new(record.clone()),
                });
            }
            Err(e) => {
                let _ = event_tx.send(CompressEvent::Failed {
                    message: e.user_message(),
                });
            }
        }
        finished
    }

    fn forward(&mut self, ev: CompressEvent, event_tx: &UnboundedSender<CompressEvent>) {
        if let CompressEvent::Progress { percent } = ev {
            let _ = self.record_progress(percent);
        }
        let _ = event_tx.send(ev);
    }

    /// Loaded/Result → Idle. The active preview is revoked; the result stays with history.
    pub fn reset(&mut self) -> Result<()> {
        match std::mem::take(&mut self.state) {
            prior @ (WorkflowState::Loaded { .. } | WorkflowState::Result { .. }) => {
                self.release_state(prior);
                self.last_error = None;
                info!("workflow reset");
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid_state("reset"))
            }
        }
    }

    /// Build a save-ready file for the active result (`None`) or a history record.
    pub fn download(&self, record: Option<RecordId>) -> Result<DownloadPayload> {
        let (reference, file_name) = match record {
            None => match &self.state {
                WorkflowState::Result {
                    original,
                    result_ref,
                    ..
                } => (result_ref, download_name(original.original_file_name())),
                _ => return Err(self.invalid_state("download")),
            },
            Some(id) => {
                let rec = self
                    .ledger
                    .get(id)
                    .ok_or(WorkflowError::UnknownRecord(id))?;
                (&rec.artifact_reference, rec.download_name())
            }
        };

        let artifact = self
            .refs
            .resolve(reference)
            .ok_or_else(|| WorkflowError::DanglingReference(reference.clone()))?;
        Ok(DownloadPayload {
            file_name,
            mime: artifact.mime(),
            bytes: artifact.bytes().clone(),
        })
    }

    /// Release every remaining reference and report the accounting.
    pub fn end_session(mut self) -> SessionSummary {
        let prior = std::mem::take(&mut self.state);
        self.release_state(prior);
        let records = self.ledger.len();
        let ledger = std::mem::take(&mut self.ledger);
        ledger.release_all(&mut self.refs);

        let summary = SessionSummary {
            records,
            references_created: self.refs.created_count(),
            references_revoked: self.refs.revoked_count(),
            references_leaked: self.refs.live_count(),
            double_revocations: self.refs.double_revocations(),
        };
        info!(?summary, "session ended");
        summary
    }
}

fn clamp_target(mb: f64) -> Option<f64> {
    mb.is_finite().then(|| mb.clamp(MIN_TARGET_MB, MAX_TARGET_MB))
}
