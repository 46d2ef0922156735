use thiserror::Error;

/// Conflicts reported synchronously by queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("item id is blank")]
    BlankItemId,

    #[error("item already queued for transcription: {0}")]
    AlreadyQueued(String),

    #[error("item already has a transcript: {0}")]
    AlreadyTranscribed(String),

    #[error("cannot cancel the active transcription: {0}")]
    CannotCancelActive(String),
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Queued item ids in processing order. The active item, if any, is
    /// the first entry.
    pub entries: Vec<String>,
    pub active: Option<String>,
}
