use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("selection contains no item ids")]
    EmptySelection,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Download,
    Transcription,
}

/// Client-side lifecycle of a server-executed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One tracked job. Immutable once terminal; destroyed only by an explicit
/// clear, never expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub job_id: String,
    pub kind: TaskKind,
    pub item_id: String,
    pub status: TaskStatus,
    /// 0 to 100, monotone while the task is live.
    pub progress: f64,
    pub message: String,
    /// Transcript text carried on a completed transcription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn pending(job_id: impl Into<String>, kind: TaskKind, item_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            item_id: item_id.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            message: String::new(),
            text: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
