use thiserror::Error;

/// Errors that can occur in the save/sync layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Document component is not ready")]
    NotReady,

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    #[error("Commit declined: {0}")]
    CommitDeclined(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Document is read-only")]
    ReadOnly,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SyncError {
    /// Whether this error ends a save after the commit was issued.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, SyncError::CommitRejected(_) | SyncError::CommitDeclined(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}
