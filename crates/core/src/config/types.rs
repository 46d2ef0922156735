use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub summarizer: SummarizerSettings,
}

/// Where the acquisition backend lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSettings {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Poll cadences for the various job kinds. Transcription polls faster
/// while the backend is still warming up (starting / loading the model)
/// and slower once real transcription work is under way.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingSettings {
    #[serde(default = "default_download_interval_ms")]
    pub download_interval_ms: u64,
    #[serde(default = "default_warmup_interval_ms")]
    pub transcription_warmup_interval_ms: u64,
    #[serde(default = "default_transcription_interval_ms")]
    pub transcription_interval_ms: u64,
    #[serde(default = "default_crawl_interval_ms")]
    pub crawl_interval_ms: u64,
    /// Fixed back-off after a transport failure. There is no retry cap: a
    /// job is only abandoned when the backend reports a terminal status.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            download_interval_ms: default_download_interval_ms(),
            transcription_warmup_interval_ms: default_warmup_interval_ms(),
            transcription_interval_ms: default_transcription_interval_ms(),
            crawl_interval_ms: default_crawl_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl PollingSettings {
    pub fn download_interval(&self) -> Duration {
        Duration::from_millis(self.download_interval_ms)
    }

    pub fn transcription_warmup_interval(&self) -> Duration {
        Duration::from_millis(self.transcription_warmup_interval_ms)
    }

    pub fn transcription_interval(&self) -> Duration {
        Duration::from_millis(self.transcription_interval_ms)
    }

    pub fn crawl_interval(&self) -> Duration {
        Duration::from_millis(self.crawl_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_download_interval_ms() -> u64 {
    1000
}

fn default_warmup_interval_ms() -> u64 {
    1000
}

fn default_transcription_interval_ms() -> u64 {
    2000
}

fn default_crawl_interval_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    3000
}

/// Transcription queue behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Pause between consecutive queue jobs, throttling backend load.
    #[serde(default = "default_queue_pacing_ms")]
    pub pacing_ms: u64,
    /// Output formats requested with each transcription.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            pacing_ms: default_queue_pacing_ms(),
            formats: default_formats(),
        }
    }
}

impl QueueSettings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

fn default_queue_pacing_ms() -> u64 {
    1000
}

fn default_formats() -> Vec<String> {
    vec!["txt".to_string(), "srt".to_string()]
}

/// Batch action behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchSettings {
    /// Pause between sequential summarization calls. The summarizer is
    /// rate-sensitive and has no queue of its own.
    #[serde(default = "default_summary_pacing_ms")]
    pub summary_pacing_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            summary_pacing_ms: default_summary_pacing_ms(),
        }
    }
}

impl BatchSettings {
    pub fn summary_pacing(&self) -> Duration {
        Duration::from_millis(self.summary_pacing_ms)
    }
}

fn default_summary_pacing_ms() -> u64 {
    1000
}

/// Where the catalog is persisted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("mediadeck_data")
}

/// Settings forwarded to the backend's summarization endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummarizerSettings {
    #[serde(default = "default_summarizer_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    #[serde(default = "default_summarizer_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub include_timestamps: bool,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            base_url: default_summarizer_base_url(),
            api_key: String::new(),
            model: default_summarizer_model(),
            prompt: default_summarizer_prompt(),
            include_timestamps: false,
        }
    }
}

fn default_summarizer_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_summarizer_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_summarizer_prompt() -> String {
    "Summarize the key points of the following transcript:".to_string()
}

/// Config safe to print or serve back: the summarizer API key is redacted.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub backend: BackendSettings,
    pub polling: PollingSettings,
    pub queue: QueueSettings,
    pub batch: BatchSettings,
    pub storage: StorageSettings,
    pub summarizer: SanitizedSummarizerSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSummarizerSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub include_timestamps: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            backend: config.backend.clone(),
            polling: config.polling.clone(),
            queue: config.queue.clone(),
            batch: config.batch.clone(),
            storage: config.storage.clone(),
            summarizer: SanitizedSummarizerSettings {
                base_url: config.summarizer.base_url.clone(),
                api_key: if config.summarizer.api_key.is_empty() {
                    String::new()
                } else {
                    "***".to_string()
                },
                model: config.summarizer.model.clone(),
                include_timestamps: config.summarizer.include_timestamps,
            },
        }
    }
}
