use thiserror::Error;

use crate::model::{RecordId, StateKind};
use crate::references::ArtifactRef;

pub type Result<T> = std::result::Result<T, WorkflowError>;

pub const INVALID_INPUT_MESSAGE: &str = "Please upload a valid image file (JPEG, PNG, WEBP).";
pub const COMPRESSION_FAILED_MESSAGE: &str =
    "An error occurred while compressing your image. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidInputReason {
    #[error("no file selected")]
    NoFile,

    #[error("{0} files selected, expected one")]
    TooManyFiles(usize),

    #[error("file type not declared")]
    UndeclaredType,

    #[error("unsupported type {0}")]
    UnsupportedType(String),

    #[error("file is empty")]
    EmptyFile,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    InvalidInput(InvalidInputReason),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: StateKind,
    },

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("no history record {0}")]
    UnknownRecord(RecordId),

    #[error("reference {0} was already revoked")]
    DanglingReference(ArtifactRef),
}

impl WorkflowError {
    /// Message suitable for showing inline to the user.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::InvalidInput(_) => INVALID_INPUT_MESSAGE.to_string(),
            WorkflowError::CompressionFailed(_) => COMPRESSION_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
