//! Text summary builder for CLI output.
//!
//! Formats before/after statistics, history listings and workflow status as plain lines.

use crate::ledger::HistoryLedger;
use crate::metrics::format_mb;
use crate::model::HistoryRecord;
use crate::workflow::WorkflowController;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Original / compressed / saved, as shown after a compression completes.
pub fn build_record_summary(record: &HistoryRecord) -> TextSummary {
    TextSummary {
        lines: vec![
            format!("Compression complete: {}", record.original_file_name),
            format!("Original:   {}", format_mb(record.original_size_bytes)),
            format!("Compressed: {}", format_mb(record.compressed_size_bytes)),
            format!("Saved:      {}%", record.savings_percent),
            format!("Download:   {} ({})", record.download_name(), record.id),
        ],
    }
}

pub fn build_history_lines(ledger: &HistoryLedger) -> Vec<String> {
    if ledger.is_empty() {
        return vec!["No compressions yet".to_string()];
    }
    ledger
        .list()
        .map(|r| {
            format!(
                "{:>4}  {}  {} -> {} ({}%)  {}",
                r.id.to_string(),
                r.original_file_name,
                format_mb(r.original_size_bytes),
                format_mb(r.compressed_size_bytes),
                r.savings_percent,
                r.created_at
            )
        })
        .collect()
}

pub fn build_status_lines(controller: &WorkflowController) -> Vec<String> {
    let state = controller.state();
    let mut lines = vec![format!("State: {}", state.kind())];
    if let Some(original) = state.original() {
        lines.push(format!(
            "File: {} ({})",
            original.original_file_name(),
            format_mb(original.size_bytes())
        ));
    }
    if let Some(progress) = state.progress() {
        lines.push(format!("Progress: {progress}%"));
    }
    lines.push(format!("Target: {:.2} MB", controller.target_mb()));
    lines.push(format!("History: {} record(s)", controller.ledger().len()));
    if let Some(err) = controller.last_error() {
        lines.push(format!("Error: {}", err.user_message()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageArtifact, ImageMime, RecordId};
    use crate::references::ReferenceTable;
    use std::sync::Arc;

    #[test]
    fn record_summary_shows_sizes_and_savings() {
        let mut refs = ReferenceTable::new();
        let record = HistoryRecord {
            id: RecordId(2),
            original_file_name: "cat.png".into(),
            original_size_bytes: 2 * 1024 * 1024,
            compressed_size_bytes: 512 * 1024,
            savings_percent: 75,
            mime: ImageMime::Png,
            artifact_reference: refs.create(Arc::new(ImageArtifact::new(
                vec![0u8],
                ImageMime::Png,
                "cat.png",
            ))),
            created_at: "2024-05-01T10:00:00Z".into(),
        };
        let lines = build_record_summary(&record).lines;
        assert_eq!(lines[1], "Original:   2.00 MB");
        assert_eq!(lines[2], "Compressed: 0.50 MB");
        assert_eq!(lines[3], "Saved:      75%");
        assert_eq!(lines[4], "Download:   min-cat.png (#2)");
    }

    #[test]
    fn empty_history_has_placeholder() {
        assert_eq!(
            build_history_lines(&HistoryLedger::new()),
            vec!["No compressions yet".to_string()]
        );
    }
}
