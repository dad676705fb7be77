//! Session history of completed compressions.
//!
//! Records are only ever appended. A record owns its artifact reference for as long as it
//! sits in the ledger, so nothing else may revoke that reference.

use std::collections::VecDeque;
use tracing::debug;

use crate::model::{HistoryRecord, RecordId};
use crate::references::{ArtifactRef, ReferenceTable};

#[derive(Debug, Default)]
pub struct HistoryLedger {
    // Most recent first.
    records: VecDeque<HistoryRecord>,
    last_id: u64,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next record. Ids are strictly increasing.
    pub fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        RecordId(self.last_id)
    }

    /// Insert at the head. The ledger now owns `record.artifact_reference`.
    pub fn append(&mut self, record: HistoryRecord) {
        debug!(
            id = record.id.0,
            reference = record.artifact_reference.as_str(),
            "history record appended"
        );
        self.records.push_front(record);
    }

    /// All records, most recent first.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &HistoryRecord> + '_ {
        self.records.iter()
    }

    pub fn head(&self) -> Option<&HistoryRecord> {
        self.records.front()
    }

    pub fn get(&self, id: RecordId) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True iff some record holds exactly this reference.
    pub fn reference_is_owned(&self, reference: &ArtifactRef) -> bool {
        self.records
            .iter()
            .any(|r| &r.artifact_reference == reference)
    }

    /// End of session: drop every record and revoke the references they owned.
    pub fn release_all(self, refs: &mut ReferenceTable) -> usize {
        let mut released = 0;
        for record in self.records {
            if refs.revoke(&record.artifact_reference) {
                released += 1;
            }
        }
        released
    }
}
