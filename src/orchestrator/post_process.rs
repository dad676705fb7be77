//! Post-compression processing utilities.
//!
//! Handles saving the result, history export and summary lines after a one-shot run.

use crate::export;
use crate::model::HistoryRecord;
use crate::text_summary;
use crate::workflow::WorkflowController;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub struct ProcessedResult {
    pub summary_lines: Vec<String>,
    pub saved_path: Option<PathBuf>,
    pub messages: Vec<String>,
}

/// Save the active result into `out_dir`, optionally export history, and build summary lines.
pub fn process_completion(
    controller: &WorkflowController,
    record: &HistoryRecord,
    out_dir: &Path,
    export_json: Option<&Path>,
) -> ProcessedResult {
    let mut messages = Vec::new();

    let saved_path = match controller
        .download(None)
        .map_err(anyhow::Error::from)
        .and_then(|payload| export::save_download(out_dir, &payload))
    {
        Ok(path) => Some(path),
        Err(e) => {
            messages.push(format!("Save failed: {e:#}"));
            None
        }
    };

    if let Some(export_path) = export_json {
        let history: Vec<HistoryRecord> = controller.ledger().list().cloned().collect();
        match export::export_history_json(export_path, &history) {
            Ok(()) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedResult {
        summary_lines: text_summary::build_record_summary(record).lines,
        saved_path,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompressConfig, FileInput, ImageArtifact, ImageMime};

    #[test]
    fn completion_saves_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = WorkflowController::new(&CompressConfig::default());
        c.submit(vec![FileInput::new("p.png", "image/png", vec![9u8; 80])])
            .unwrap();
        c.begin_compress().unwrap();
        let record = c
            .finish_compress(Ok(ImageArtifact::new(vec![3u8; 20], ImageMime::Png, "p.png")))
            .unwrap();

        let export_path = dir.path().join("history.json");
        let processed = process_completion(&c, &record, dir.path(), Some(&export_path));

        let saved = processed.saved_path.unwrap();
        assert!(saved.ends_with("min-p.png"));
        assert_eq!(std::fs::read(saved).unwrap(), vec![3u8; 20]);
        assert!(export_path.exists());
        assert_eq!(processed.messages.len(), 1);
        assert!(processed.summary_lines.iter().any(|l| l.contains("75%")));
    }
}
