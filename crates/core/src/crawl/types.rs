use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no keywords to crawl")]
    NoKeywords,

    #[error("a crawl is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Client-side phase of the crawl session.
///
/// The backend only knows running/paused/stopped; `Stopping` exists locally
/// between a stop command and the next not-running poll, and a not-running
/// poll resolves to `Idle`, `Completed` or `Failed` depending on how the
/// run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
}

impl CrawlPhase {
    /// Phases during which a new crawl cannot start.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CrawlPhase::Running | CrawlPhase::Paused | CrawlPhase::Stopping
        )
    }
}

/// Point-in-time view of a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlProgress {
    pub phase: CrawlPhase,
    pub progress: f64,
    pub current_keyword: Option<String>,
    pub processed_keywords: u32,
    pub total_keywords: u32,
    /// Items discovered so far, as reported by the last poll.
    pub discovered: usize,
    pub error: Option<String>,
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self {
            phase: CrawlPhase::Idle,
            progress: 0.0,
            current_keyword: None,
            processed_keywords: 0,
            total_keywords: 0,
            discovered: 0,
            error: None,
        }
    }
}
