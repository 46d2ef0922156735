//! HTTP implementation of the backend client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BackendSettings;

use super::{
    BackendClient, BackendError, CrawlRequest, CrawlerStatusReport, DownloadKind,
    DownloadStatusReport, DownloadedEntry, FileEntry, SummarizeRequest, TranscriptionOutcome,
    TranscriptionStatusReport,
};

/// Backend client talking HTTP with JSON bodies.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new client from configuration.
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs as u64))
            .build()
            .map_err(|e| BackendError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_request_error(e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::ConnectionFailed(e.to_string())
        }
    }

    /// Decode a response body, mapping non-2xx statuses to `Http` except
    /// when the body carries a backend-reported `error` field, which is the
    /// backend's way of reporting a job-level failure.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        let body = response.text().await.map_err(Self::map_request_error)?;

        if !status.is_success() {
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                if let Some(msg) = value.get("error").and_then(Value::as_str) {
                    return Err(BackendError::Api(msg.to_string()));
                }
            }
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::decode(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let _: Value = Self::decode(response).await?;
        Ok(())
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit_download(
        &self,
        item_ids: &[String],
        kind: DownloadKind,
    ) -> Result<Vec<String>, BackendError> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(rename = "itemIds")]
            item_ids: &'a [String],
            #[serde(rename = "type")]
            kind: DownloadKind,
        }

        #[derive(serde::Deserialize)]
        struct Reply {
            #[serde(rename = "taskIds", alias = "task_ids", default)]
            task_ids: Vec<String>,
        }

        debug!(count = item_ids.len(), kind = kind.as_str(), "submitting downloads");
        let reply: Reply = self
            .post_json("/download", &Body { item_ids, kind })
            .await?;
        Ok(reply.task_ids)
    }

    async fn download_status(&self, job_id: &str) -> Result<DownloadStatusReport, BackendError> {
        self.get_json(&format!("/download/status/{}", job_id)).await
    }

    async fn submit_transcription(
        &self,
        item_id: &str,
        formats: &[String],
    ) -> Result<TranscriptionOutcome, BackendError> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(rename = "itemId")]
            item_id: &'a str,
            formats: &'a [String],
        }

        let value: Value = self
            .post_json("/transcribe", &Body { item_id, formats })
            .await?;

        let job_id = value
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("transcribe_{}", item_id));

        // A cache hit comes back with status "completed" and the full
        // result inline; anything else is a freshly accepted job.
        if value.get("status").and_then(Value::as_str) == Some("completed") {
            let report: TranscriptionStatusReport = serde_json::from_value(value)
                .map_err(|e| BackendError::Decode(e.to_string()))?;
            Ok(TranscriptionOutcome::Completed { job_id, report })
        } else {
            Ok(TranscriptionOutcome::Accepted { job_id })
        }
    }

    async fn transcription_status(
        &self,
        job_id: &str,
    ) -> Result<TranscriptionStatusReport, BackendError> {
        self.get_json(&format!("/transcribe/status/{}", job_id))
            .await
    }

    async fn summarize(&self, request: &SummarizeRequest) -> Result<String, BackendError> {
        let value: Value = self.post_json("/summarize", request).await?;

        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return Err(BackendError::Api(msg.to_string()));
        }

        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if summary.trim().is_empty() {
            return Err(BackendError::Api("backend returned an empty summary".into()));
        }
        Ok(summary.to_string())
    }

    async fn start_crawl(&self, request: &CrawlRequest) -> Result<u32, BackendError> {
        #[derive(serde::Deserialize)]
        struct Reply {
            #[serde(default)]
            keywords_count: u32,
        }

        let reply: Reply = self
            .post_json("/crawler/start-with-keywords", request)
            .await?;
        Ok(reply.keywords_count)
    }

    async fn upload_keywords(
        &self,
        filename: &str,
        content: Vec<u8>,
        options: &CrawlRequest,
    ) -> Result<u32, BackendError> {
        #[derive(serde::Deserialize)]
        struct Reply {
            #[serde(default)]
            keywords_count: u32,
        }

        let part = multipart::Part::bytes(content).file_name(filename.to_string());
        let form = multipart::Form::new()
            .part("file", part)
            .text("pages", options.pages.to_string())
            .text(
                "enable_detailed_info",
                options.enable_detailed_info.to_string(),
            )
            .text("remove_duplicates", options.remove_duplicates.to_string());

        let response = self
            .client
            .post(self.url("/crawler/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let reply: Reply = Self::decode(response).await?;
        Ok(reply.keywords_count)
    }

    async fn crawler_status(&self) -> Result<CrawlerStatusReport, BackendError> {
        self.get_json("/crawler/status").await
    }

    async fn pause_crawl(&self) -> Result<(), BackendError> {
        self.post_empty("/crawler/pause").await
    }

    async fn resume_crawl(&self) -> Result<(), BackendError> {
        self.post_empty("/crawler/resume").await
    }

    async fn stop_crawl(&self) -> Result<(), BackendError> {
        self.post_empty("/crawler/stop").await
    }

    async fn item_files(&self, item_id: &str) -> Result<Vec<FileEntry>, BackendError> {
        #[derive(serde::Deserialize)]
        struct Reply {
            #[serde(default)]
            files: Vec<FileEntry>,
        }

        let reply: Reply = self.get_json(&format!("/files/{}", item_id)).await?;
        Ok(reply.files)
    }

    async fn item_transcript(&self, item_id: &str) -> Result<Option<String>, BackendError> {
        match self
            .get_json::<Value>(&format!("/transcript/{}", item_id))
            .await
        {
            Ok(value) => Ok(value
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)),
            // No transcript yet is a valid state, not an error.
            Err(BackendError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadedEntry>, BackendError> {
        #[derive(serde::Deserialize)]
        struct Reply {
            #[serde(default)]
            downloads: Vec<DownloadedEntry>,
        }

        let reply: Reply = self.get_json("/downloads").await?;
        Ok(reply.downloads)
    }

    async fn delete_item(&self, item_id: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.url(&format!("/delete/{}", item_id)))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let value: Value = Self::decode(response).await?;
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return Err(BackendError::Api(msg.to_string()));
        }
        Ok(())
    }
}
