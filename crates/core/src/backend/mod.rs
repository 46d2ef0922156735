//! Client for the acquisition backend.
//!
//! The backend is an opaque collaborator reached over HTTP with JSON bodies.
//! It executes the heavy work (crawling, downloading, transcribing,
//! summarizing); this crate only submits jobs and polls their status.

mod http;
mod types;

use async_trait::async_trait;

pub use http::HttpBackend;
pub use types::{
    BackendError, CrawlRequest, CrawlerStatusReport, DownloadKind, DownloadPhase,
    DownloadStatusReport, DownloadedEntry, FileEntry, SearchItem, SummarizeRequest,
    TranscriptSegment, TranscriptionOutcome, TranscriptionPhase, TranscriptionStatusReport,
};

/// Trait for the acquisition backend.
///
/// Every method is a single stateless request; all lifecycle tracking
/// happens on the caller's side.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit download jobs for a set of items. Returns one job id per
    /// item, aligned with the input order.
    async fn submit_download(
        &self,
        item_ids: &[String],
        kind: DownloadKind,
    ) -> Result<Vec<String>, BackendError>;

    /// Poll the status of a download job.
    async fn download_status(&self, job_id: &str) -> Result<DownloadStatusReport, BackendError>;

    /// Submit a transcription job for an item. May resolve synchronously
    /// when the backend already holds a finished transcript.
    async fn submit_transcription(
        &self,
        item_id: &str,
        formats: &[String],
    ) -> Result<TranscriptionOutcome, BackendError>;

    /// Poll the status of a transcription job.
    async fn transcription_status(
        &self,
        job_id: &str,
    ) -> Result<TranscriptionStatusReport, BackendError>;

    /// Summarize a transcript. Returns the summary text.
    async fn summarize(&self, request: &SummarizeRequest) -> Result<String, BackendError>;

    /// Start a crawl from an explicit keyword list. Returns the number of
    /// keywords the backend accepted.
    async fn start_crawl(&self, request: &CrawlRequest) -> Result<u32, BackendError>;

    /// Start a crawl from an uploaded keyword file. The `keywords` field of
    /// `options` is ignored; the file content is authoritative.
    async fn upload_keywords(
        &self,
        filename: &str,
        content: Vec<u8>,
        options: &CrawlRequest,
    ) -> Result<u32, BackendError>;

    /// Poll the global crawler status.
    async fn crawler_status(&self) -> Result<CrawlerStatusReport, BackendError>;

    /// Ask the crawler to pause. Fire-and-forget: the authoritative phase
    /// is whatever the next status poll reports.
    async fn pause_crawl(&self) -> Result<(), BackendError>;

    /// Ask the crawler to resume.
    async fn resume_crawl(&self) -> Result<(), BackendError>;

    /// Ask the crawler to stop.
    async fn stop_crawl(&self) -> Result<(), BackendError>;

    /// List the files stored for an item. An item with no files yields an
    /// empty list, not an error.
    async fn item_files(&self, item_id: &str) -> Result<Vec<FileEntry>, BackendError>;

    /// Fetch the stored transcript for an item, if one exists. A missing
    /// transcript is a valid state, not an error.
    async fn item_transcript(&self, item_id: &str) -> Result<Option<String>, BackendError>;

    /// List everything the backend's storage holds, one entry per item.
    async fn list_downloads(&self) -> Result<Vec<DownloadedEntry>, BackendError>;

    /// Delete an item's downloaded files from the backend's storage.
    async fn delete_item(&self, item_id: &str) -> Result<(), BackendError>;
}
