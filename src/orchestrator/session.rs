//! Session command loop.
//!
//! Owns the workflow controller, applies commands from presentation layers and runs at most
//! one compression at a time as a spawned task. Commands that arrive while a compression is in
//! flight are answered against the `Compressing` state, so submissions are rejected rather
//! than queued.

use crate::engine::CompressionEngine;
use crate::error::WorkflowError;
use crate::model::{CompressEvent, FileInput, HistoryRecord, ImageArtifact, InfoEvent, RecordId};
use crate::text_summary;
use crate::workflow::{SessionSummary, WorkflowController};
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Submit(Vec<FileInput>),
    SetTarget(f64),
    Compress,
    /// Save the active result (`None`) or a history record to the output directory.
    Download(Option<RecordId>),
    History,
    Reset,
    Status,
    Quit,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub out_dir: PathBuf,
    pub auto_compress: bool,
}

/// What is left once the session ends.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Most recent first.
    pub history: Vec<HistoryRecord>,
    pub summary: SessionSummary,
}

type CompressHandle = JoinHandle<Result<ImageArtifact, WorkflowError>>;

struct Session {
    controller: WorkflowController,
    engine: CompressionEngine,
    opts: SessionOptions,
    event_tx: UnboundedSender<CompressEvent>,
    progress_tx: UnboundedSender<CompressEvent>,
}

impl Session {
    fn emit(&self, ev: CompressEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn info(&self, info: InfoEvent) {
        self.emit(CompressEvent::Info(info));
    }

    fn emit_state(&self) {
        self.emit(CompressEvent::StateChanged {
            state: self.controller.kind(),
        });
    }

    fn reject(&self, err: &WorkflowError) {
        debug!(error = %err, "command rejected");
        self.info(InfoEvent::Rejected {
            message: err.user_message(),
        });
    }

    /// Loaded → Compressing and spawn the transcoder.
    fn start_compress(&mut self) -> Option<CompressHandle> {
        match self.controller.begin_compress() {
            Ok(job) => {
                self.emit_state();
                let engine = self.engine.clone();
                let progress_tx = self.progress_tx.clone();
                Some(tokio::spawn(async move {
                    engine.run(job.input, job.options, progress_tx).await
                }))
            }
            Err(e) => {
                self.reject(&e);
                None
            }
        }
    }

    fn apply_progress(&mut self, ev: CompressEvent) {
        if let CompressEvent::Progress { percent } = ev {
            if let Ok(p) = self.controller.record_progress(percent) {
                self.emit(CompressEvent::Progress { percent: p });
            }
        }
    }

    fn complete(&mut self, outcome: Result<ImageArtifact, WorkflowError>) {
        match self.controller.finish_compress(outcome) {
            Ok(record) => {
                self.emit_state();
                for line in text_summary::build_record_summary(&record).lines {
                    self.info(InfoEvent::Message(line));
                }
                self.emit(CompressEvent::Completed {
                    record: Box::new(record),
                });
            }
            Err(e) => {
                self.emit_state();
                self.emit(CompressEvent::Failed {
                    message: e.user_message(),
                });
            }
        }
    }

    fn download(&self, record: Option<RecordId>) {
        let payload = match self.controller.download(record) {
            Ok(p) => p,
            Err(e) => return self.reject(&e),
        };
        match crate::export::save_download(&self.opts.out_dir, &payload) {
            Ok(path) => self.info(InfoEvent::Saved {
                path: path.display().to_string(),
            }),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "download failed");
                self.info(InfoEvent::Message(format!("Save failed: {e:#}")));
            }
        }
    }
}

/// Run commands against a controller until `Quit` (or the command channel closes).
pub async fn run_session(
    controller: WorkflowController,
    engine: CompressionEngine,
    opts: SessionOptions,
    event_tx: UnboundedSender<CompressEvent>,
    mut cmd_rx: UnboundedReceiver<SessionCommand>,
) -> SessionOutcome {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<CompressEvent>();
    let mut session = Session {
        controller,
        engine,
        opts,
        event_tx,
        progress_tx,
    };
    let mut in_flight: Option<CompressHandle> = None;
    let mut quit_pending = false;
    let mut commands_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open && !quit_pending => {
                match cmd {
                    Some(SessionCommand::Submit(files)) => {
                        match session.controller.submit(files) {
                            Ok(_) => {
                                if let Some(original) = session.controller.state().original() {
                                    session.info(InfoEvent::Loaded {
                                        name: original.original_file_name().to_string(),
                                        size_bytes: original.size_bytes(),
                                    });
                                }
                                session.emit_state();
                                if session.opts.auto_compress {
                                    in_flight = session.start_compress();
                                }
                            }
                            Err(e) => session.reject(&e),
                        }
                    }
                    Some(SessionCommand::SetTarget(mb)) => {
                        let stored = session.controller.set_target(mb);
                        session.info(InfoEvent::Message(format!("Target: {stored:.2} MB")));
                    }
                    Some(SessionCommand::Compress) => {
                        if in_flight.is_some() {
                            // Controller is Compressing; let it produce the rejection.
                            if let Err(e) = session.controller.begin_compress() {
                                session.reject(&e);
                            }
                        } else {
                            in_flight = session.start_compress();
                        }
                    }
                    Some(SessionCommand::Download(record)) => session.download(record),
                    Some(SessionCommand::History) => {
                        let lines = text_summary::build_history_lines(session.controller.ledger());
                        session.info(InfoEvent::History { lines });
                    }
                    Some(SessionCommand::Reset) => match session.controller.reset() {
                        Ok(()) => session.emit_state(),
                        Err(e) => session.reject(&e),
                    },
                    Some(SessionCommand::Status) => {
                        let lines = text_summary::build_status_lines(&session.controller);
                        session.info(InfoEvent::Message(lines.join("\n")));
                    }
                    Some(SessionCommand::Quit) => {
                        // Quit waits for the current compression to settle.
                        quit_pending = true;
                        if in_flight.is_none() {
                            break;
                        }
                        session.info(InfoEvent::Message("Finishing current compression…".into()));
                    }
                    None => {
                        commands_open = false;
                        quit_pending = true;
                        if in_flight.is_none() {
                            break;
                        }
                    }
                }
            }
            Some(ev) = progress_rx.recv() => session.apply_progress(ev),
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(h) = in_flight.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    in_flight = None;
                    // Every progress send happened before the task finished.
                    while let Ok(ev) = progress_rx.try_recv() {
                        session.apply_progress(ev);
                    }
                    let outcome = join_res.unwrap_or_else(|e| {
                        Err(WorkflowError::CompressionFailed(format!("compression task failed: {e}")))
                    });
                    session.complete(outcome);
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    let history = session.controller.ledger().list().cloned().collect();
    SessionOutcome {
        history,
        summary: session.controller.end_session(),
    }
}
