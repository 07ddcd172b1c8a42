use approval_types::WorkflowError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("version mismatch: {0}")]
    VersionMismatch(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => WorkflowError::Storage(format!("missing: {msg}")),
            StorageError::Conflict(msg) | StorageError::VersionMismatch(msg) => {
                WorkflowError::Conflict(msg)
            }
            StorageError::Backend(msg) => WorkflowError::Storage(msg),
        }
    }
}
