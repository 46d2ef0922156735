//! Scriptable in-memory backend for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{
    BackendClient, BackendError, CrawlRequest, CrawlerStatusReport, DownloadKind,
    DownloadStatusReport, DownloadedEntry, FileEntry, SummarizeRequest, TranscriptionOutcome,
    TranscriptionStatusReport,
};

/// Every request a test made against the mock, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Download {
        item_ids: Vec<String>,
        kind: DownloadKind,
    },
    Transcribe {
        item_id: String,
    },
    Summarize {
        model: String,
    },
    CrawlStart {
        keywords: Vec<String>,
    },
    CrawlUpload {
        filename: String,
    },
    CrawlPause,
    CrawlResume,
    CrawlStop,
    Delete {
        item_id: String,
    },
}

/// Mock backend with scripted status sequences.
///
/// Status scripts are consumed one report per poll; the last report of a
/// script repeats forever, so a terminal tail keeps answering late polls.
/// `fail_next` injects a one-shot error returned by whichever call comes
/// next.
#[derive(Default)]
pub struct MockBackend {
    requests: Mutex<Vec<RecordedRequest>>,
    next_error: Mutex<Option<BackendError>>,
    download_scripts: Mutex<HashMap<String, VecDeque<DownloadStatusReport>>>,
    download_calls: Mutex<HashMap<String, usize>>,
    transcription_scripts: Mutex<HashMap<String, VecDeque<TranscriptionStatusReport>>>,
    transcription_cache: Mutex<HashMap<String, TranscriptionStatusReport>>,
    download_reply_override: Mutex<Option<Vec<String>>>,
    crawler_script: Mutex<VecDeque<CrawlerStatusReport>>,
    summary: Mutex<String>,
    files: Mutex<HashMap<String, Vec<FileEntry>>>,
    transcripts: Mutex<HashMap<String, String>>,
    downloads: Mutex<Vec<DownloadedEntry>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            summary: Mutex::new("mock summary".to_string()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Make the next call, whatever it is, fail with this error.
    pub fn fail_next(&self, error: BackendError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Make the next download submission reply with exactly these task ids
    /// instead of the derived one-per-item set.
    pub fn override_next_download_reply(&self, task_ids: Vec<String>) {
        *self.download_reply_override.lock().unwrap() = Some(task_ids);
    }

    pub fn script_download_status(&self, job_id: &str, reports: Vec<DownloadStatusReport>) {
        self.download_scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reports.into());
    }

    pub fn script_transcription_status(&self, job_id: &str, reports: Vec<TranscriptionStatusReport>) {
        self.transcription_scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reports.into());
    }

    /// Make `submit_transcription` for this item resolve synchronously with
    /// a finished report, the way the real backend answers a cache hit.
    pub fn set_transcription_cache(&self, item_id: &str, report: TranscriptionStatusReport) {
        self.transcription_cache
            .lock()
            .unwrap()
            .insert(item_id.to_string(), report);
    }

    pub fn script_crawler_status(&self, reports: Vec<CrawlerStatusReport>) {
        *self.crawler_script.lock().unwrap() = reports.into();
    }

    pub fn set_summary(&self, summary: &str) {
        *self.summary.lock().unwrap() = summary.to_string();
    }

    pub fn set_files(&self, item_id: &str, files: Vec<FileEntry>) {
        self.files.lock().unwrap().insert(item_id.to_string(), files);
    }

    pub fn set_transcript(&self, item_id: &str, text: &str) {
        self.transcripts
            .lock()
            .unwrap()
            .insert(item_id.to_string(), text.to_string());
    }

    pub fn set_downloads(&self, entries: Vec<DownloadedEntry>) {
        *self.downloads.lock().unwrap() = entries;
    }

    /// How many times a download job's status was polled.
    pub fn download_status_calls(&self, job_id: &str) -> usize {
        self.download_calls
            .lock()
            .unwrap()
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn take_error(&self) -> Result<(), BackendError> {
        match self.next_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn next_scripted<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_download(
        &self,
        item_ids: &[String],
        kind: DownloadKind,
    ) -> Result<Vec<String>, BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::Download {
            item_ids: item_ids.to_vec(),
            kind,
        });
        if let Some(task_ids) = self.download_reply_override.lock().unwrap().take() {
            return Ok(task_ids);
        }
        Ok(item_ids
            .iter()
            .map(|id| format!("{}_{}", id, kind.as_str()))
            .collect())
    }

    async fn download_status(&self, job_id: &str) -> Result<DownloadStatusReport, BackendError> {
        *self
            .download_calls
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_insert(0) += 1;
        self.take_error()?;
        let mut scripts = self.download_scripts.lock().unwrap();
        scripts
            .get_mut(job_id)
            .and_then(Self::next_scripted)
            .ok_or_else(|| BackendError::Api(format!("unknown task: {}", job_id)))
    }

    async fn submit_transcription(
        &self,
        item_id: &str,
        _formats: &[String],
    ) -> Result<TranscriptionOutcome, BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::Transcribe {
            item_id: item_id.to_string(),
        });
        let job_id = format!("transcribe_{}", item_id);
        if let Some(report) = self.transcription_cache.lock().unwrap().get(item_id) {
            return Ok(TranscriptionOutcome::Completed {
                job_id,
                report: report.clone(),
            });
        }
        Ok(TranscriptionOutcome::Accepted { job_id })
    }

    async fn transcription_status(
        &self,
        job_id: &str,
    ) -> Result<TranscriptionStatusReport, BackendError> {
        self.take_error()?;
        let mut scripts = self.transcription_scripts.lock().unwrap();
        scripts
            .get_mut(job_id)
            .and_then(Self::next_scripted)
            .ok_or_else(|| BackendError::Api(format!("unknown task: {}", job_id)))
    }

    async fn summarize(&self, request: &SummarizeRequest) -> Result<String, BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::Summarize {
            model: request.model.clone(),
        });
        Ok(self.summary.lock().unwrap().clone())
    }

    async fn start_crawl(&self, request: &CrawlRequest) -> Result<u32, BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::CrawlStart {
            keywords: request.keywords.clone(),
        });
        Ok(request.keywords.len() as u32)
    }

    async fn upload_keywords(
        &self,
        filename: &str,
        content: Vec<u8>,
        _options: &CrawlRequest,
    ) -> Result<u32, BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::CrawlUpload {
            filename: filename.to_string(),
        });
        let lines = content
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .count();
        Ok(lines as u32)
    }

    async fn crawler_status(&self) -> Result<CrawlerStatusReport, BackendError> {
        self.take_error()?;
        let mut script = self.crawler_script.lock().unwrap();
        Ok(Self::next_scripted(&mut script).unwrap_or_default())
    }

    async fn pause_crawl(&self) -> Result<(), BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::CrawlPause);
        Ok(())
    }

    async fn resume_crawl(&self) -> Result<(), BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::CrawlResume);
        Ok(())
    }

    async fn stop_crawl(&self) -> Result<(), BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::CrawlStop);
        Ok(())
    }

    async fn item_files(&self, item_id: &str) -> Result<Vec<FileEntry>, BackendError> {
        self.take_error()?;
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn item_transcript(&self, item_id: &str) -> Result<Option<String>, BackendError> {
        self.take_error()?;
        Ok(self.transcripts.lock().unwrap().get(item_id).cloned())
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadedEntry>, BackendError> {
        self.take_error()?;
        Ok(self.downloads.lock().unwrap().clone())
    }

    async fn delete_item(&self, item_id: &str) -> Result<(), BackendError> {
        self.take_error()?;
        self.record(RecordedRequest::Delete {
            item_id: item_id.to_string(),
        });
        self.downloads
            .lock()
            .unwrap()
            .retain(|entry| entry.item_id != item_id);
        Ok(())
    }
}
