//! Types for the acquisition backend client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("backend error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Transport-level failures (network, non-2xx, undecodable body) are
    /// transient: pollers retry them instead of marking the job failed.
    /// `Api` means the backend itself reported a failure and is terminal.
    pub fn is_transport(&self) -> bool {
        !matches!(self, BackendError::Api(_))
    }
}

/// What to fetch when submitting a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    Audio,
    VideoOnly,
    Merged,
    Danmaku,
}

impl DownloadKind {
    /// String form used on the wire and in job ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Audio => "audio",
            DownloadKind::VideoOnly => "video_only",
            DownloadKind::Merged => "merged",
            DownloadKind::Danmaku => "danmaku",
        }
    }
}

/// Server-reported phase of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    Downloading,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

/// One poll response for a download job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadStatusReport {
    pub status: DownloadPhase,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
}

impl DownloadStatusReport {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DownloadPhase::Completed | DownloadPhase::Error)
    }
}

/// Server-reported phase of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionPhase {
    Starting,
    LoadingModel,
    Transcribing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

/// A timestamped slice of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One poll response for a transcription job. The transcript text and
/// segments are only present once the job has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionStatusReport {
    pub status: TranscriptionPhase,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl TranscriptionStatusReport {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TranscriptionPhase::Completed | TranscriptionPhase::Error
        )
    }
}

/// Result of submitting a transcription: the backend answers synchronously
/// when it already holds a finished transcript, otherwise it hands back a
/// job id to poll.
#[derive(Debug, Clone)]
pub enum TranscriptionOutcome {
    /// Cache hit: the full result came back in the submission response.
    Completed {
        job_id: String,
        report: TranscriptionStatusReport,
    },
    /// Job accepted: poll `transcription_status` until terminal.
    Accepted { job_id: String },
}

/// Request body for the summarization endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SummarizeRequest {
    pub text: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub include_timestamps: bool,
}

/// An item discovered by a keyword crawl. Wire names follow the backend's
/// search schema; `item_id` is the stable external identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(rename = "bvid")]
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub play: u64,
    #[serde(default, rename = "review")]
    pub comments: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SearchItem {
    /// A stub record for an item first seen outside a crawl result
    /// (e.g. found on disk by a storage query).
    pub fn stub(item_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// One poll response from the crawler status endpoint. The server always
/// returns the full accumulated item set, never a delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerStatusReport {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_keyword: Option<String>,
    #[serde(default)]
    pub processed_keywords: u32,
    #[serde(default)]
    pub total_keywords: u32,
    #[serde(default)]
    pub videos: Vec<SearchItem>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Parameters for starting a keyword crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub keywords: Vec<String>,
    pub pages: u32,
    pub enable_detailed_info: bool,
    pub remove_duplicates: bool,
}

impl CrawlRequest {
    /// Create a request with default options.
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            pages: 1,
            enable_detailed_info: false,
            remove_duplicates: true,
        }
    }

    /// Set the number of result pages to crawl per keyword.
    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    /// Enable per-item detail enrichment during the crawl.
    pub fn with_detailed_info(mut self, enabled: bool) -> Self {
        self.enable_detailed_info = enabled;
        self
    }

    /// Set whether duplicate results across keywords are removed.
    pub fn with_remove_duplicates(mut self, enabled: bool) -> Self {
        self.remove_duplicates = enabled;
        self
    }
}

/// A downloaded file on the backend's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// One entry of the downloads overview: everything the backend's storage
/// knows about an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadedEntry {
    #[serde(rename = "bvid")]
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_transcript: bool,
    #[serde(default)]
    pub file_count: u32,
    #[serde(default)]
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_kind_as_str() {
        assert_eq!(DownloadKind::Audio.as_str(), "audio");
        assert_eq!(DownloadKind::VideoOnly.as_str(), "video_only");
        assert_eq!(DownloadKind::Merged.as_str(), "merged");
        assert_eq!(DownloadKind::Danmaku.as_str(), "danmaku");
    }

    #[test]
    fn test_download_phase_deserialization() {
        let report: DownloadStatusReport =
            serde_json::from_str(r#"{"status":"downloading","progress":42.5,"message":"..."}"#)
                .unwrap();
        assert_eq!(report.status, DownloadPhase::Downloading);
        assert!((report.progress - 42.5).abs() < 0.001);
        assert!(!report.is_terminal());
    }

    #[test]
    fn test_unknown_status_string_maps_to_unknown() {
        let report: DownloadStatusReport =
            serde_json::from_str(r#"{"status":"something_new"}"#).unwrap();
        assert_eq!(report.status, DownloadPhase::Unknown);
        assert!(!report.is_terminal());
    }

    #[test]
    fn test_transcription_terminal_states() {
        let completed: TranscriptionStatusReport = serde_json::from_str(
            r#"{"status":"completed","progress":100,"text":"hello","duration":12.0}"#,
        )
        .unwrap();
        assert!(completed.is_terminal());
        assert_eq!(completed.text.as_deref(), Some("hello"));

        let loading: TranscriptionStatusReport =
            serde_json::from_str(r#"{"status":"loading_model","progress":5}"#).unwrap();
        assert_eq!(loading.status, TranscriptionPhase::LoadingModel);
        assert!(!loading.is_terminal());
    }

    #[test]
    fn test_search_item_wire_names() {
        let item: SearchItem = serde_json::from_str(
            r#"{"bvid":"BV1xx","title":"t","author":"a","play":100,"review":5}"#,
        )
        .unwrap();
        assert_eq!(item.item_id, "BV1xx");
        assert_eq!(item.comments, 5);

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"bvid\":\"BV1xx\""));
        assert!(json.contains("\"review\":5"));
    }

    #[test]
    fn test_crawler_report_tolerates_missing_fields() {
        let report: CrawlerStatusReport = serde_json::from_str(r#"{"is_running":true}"#).unwrap();
        assert!(report.is_running);
        assert!(report.videos.is_empty());
        assert!(report.error.is_none());
    }

    #[test]
    fn test_crawl_request_builder() {
        let req = CrawlRequest::new(vec!["rust".into()])
            .with_pages(3)
            .with_detailed_info(true)
            .with_remove_duplicates(false);
        assert_eq!(req.pages, 3);
        assert!(req.enable_detailed_info);
        assert!(!req.remove_duplicates);
    }

    #[test]
    fn test_backend_error_transport_classification() {
        assert!(BackendError::Timeout.is_transport());
        assert!(BackendError::ConnectionFailed("refused".into()).is_transport());
        assert!(BackendError::Http {
            status: 502,
            body: "bad gateway".into()
        }
        .is_transport());
        assert!(!BackendError::Api("no audio file".into()).is_transport());
    }
}
