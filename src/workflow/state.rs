use std::sync::Arc;

use crate::model::{ImageArtifact, RecordId, StateKind};
use crate::references::ArtifactRef;

/// The live workflow state. Replaced wholesale on every transition.
#[derive(Debug, Clone, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Loaded {
        original: Arc<ImageArtifact>,
        preview: ArtifactRef,
    },
    Compressing {
        original: Arc<ImageArtifact>,
        preview: ArtifactRef,
        progress: u8,
    },
    Result {
        original: Arc<ImageArtifact>,
        preview: ArtifactRef,
        result: Arc<ImageArtifact>,
        // Owned by the history ledger, never revoked from here.
        result_ref: ArtifactRef,
        record_id: RecordId,
    },
}

impl WorkflowState {
    pub fn kind(&self) -> StateKind {
        match self {
            WorkflowState::Idle => StateKind::Idle,
            WorkflowState::Loaded { .. } => StateKind::Loaded,
            WorkflowState::Compressing { .. } => StateKind::Compressing,
            WorkflowState::Result { .. } => StateKind::Result,
        }
    }

    pub fn original(&self) -> Option<&Arc<ImageArtifact>> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::Loaded { original, .. }
            | WorkflowState::Compressing { original, .. }
            | WorkflowState::Result { original, .. } => Some(original),
        }
    }

    pub fn preview(&self) -> Option<&ArtifactRef> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::Loaded { preview, .. }
            | WorkflowState::Compressing { preview, .. }
            | WorkflowState::Result { preview, .. } => Some(preview),
        }
    }

    pub fn result_ref(&self) -> Option<&ArtifactRef> {
        match self {
            WorkflowState::Result { result_ref, .. } => Some(result_ref),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            WorkflowState::Compressing { progress, .. } => Some(*progress),
            WorkflowState::Result { .. } => Some(100),
            _ => None,
        }
    }
}
