//! Keyword crawl controller.
//!
//! The crawler is a global singleton on the backend; this session drives it
//! and mirrors its state through a fixed-cadence poll of the status
//! endpoint. Pause, resume and stop commands never change the local phase
//! optimistically (stop excepted, which enters `Stopping` until the next
//! authoritative not-running poll). Each poll carries the full accumulated
//! item set; it is merged into the catalog whenever the reported count
//! grows.

mod types;

pub use types::{CrawlError, CrawlPhase, CrawlProgress};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::{BackendClient, CrawlRequest, CrawlerStatusReport};
use crate::catalog::CatalogStore;
use crate::config::PollingSettings;

struct SessionState {
    progress: CrawlProgress,
    stop_requested: bool,
    last_item_count: usize,
    poll_running: bool,
}

#[derive(Clone)]
pub struct CrawlSession {
    backend: Arc<dyn BackendClient>,
    catalog: Arc<CatalogStore>,
    state: Arc<Mutex<SessionState>>,
    interval: Duration,
}

impl CrawlSession {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        catalog: Arc<CatalogStore>,
        settings: &PollingSettings,
    ) -> Self {
        Self {
            backend,
            catalog,
            state: Arc::new(Mutex::new(SessionState {
                progress: CrawlProgress::default(),
                stop_requested: false,
                last_item_count: 0,
                poll_running: false,
            })),
            interval: settings.crawl_interval(),
        }
    }

    /// Start a crawl from an explicit keyword list. Blank keywords are
    /// dropped and duplicates collapsed before validation. Returns the
    /// number of keywords the backend accepted.
    pub async fn start(&self, request: CrawlRequest) -> Result<u32, CrawlError> {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in &request.keywords {
            let trimmed = keyword.trim();
            if !trimmed.is_empty() && !keywords.iter().any(|k| k == trimmed) {
                keywords.push(trimmed.to_string());
            }
        }
        if keywords.is_empty() {
            return Err(CrawlError::NoKeywords);
        }

        self.claim_start()?;
        let request = CrawlRequest { keywords, ..request };
        let count = match self.backend.start_crawl(&request).await {
            Ok(count) => count,
            Err(e) => {
                self.release_start();
                return Err(e.into());
            }
        };
        info!(keywords = count, "crawl started");
        self.spawn_poll_loop();
        Ok(count)
    }

    /// Start a crawl from an uploaded keyword file.
    pub async fn start_with_file(
        &self,
        filename: &str,
        content: Vec<u8>,
        options: CrawlRequest,
    ) -> Result<u32, CrawlError> {
        if content.is_empty() {
            return Err(CrawlError::NoKeywords);
        }

        self.claim_start()?;
        let count = match self.backend.upload_keywords(filename, content, &options).await {
            Ok(count) => count,
            Err(e) => {
                self.release_start();
                return Err(e.into());
            }
        };
        info!(keywords = count, filename, "crawl started from keyword file");
        self.spawn_poll_loop();
        Ok(count)
    }

    /// Ask the crawler to pause. The local phase only changes when a later
    /// poll reports the pause took effect.
    pub async fn pause(&self) -> Result<(), CrawlError> {
        self.backend.pause_crawl().await?;
        Ok(())
    }

    /// Ask the crawler to resume.
    pub async fn resume(&self) -> Result<(), CrawlError> {
        self.backend.resume_crawl().await?;
        Ok(())
    }

    /// Ask the crawler to stop. The session enters `Stopping` once the
    /// command is acknowledged and resolves to `Idle` on the next
    /// not-running poll, never to `Completed` or `Failed`.
    pub async fn stop(&self) -> Result<(), CrawlError> {
        self.backend.stop_crawl().await?;
        let mut state = self.state.lock().unwrap();
        state.stop_requested = true;
        if state.progress.phase.is_active() {
            state.progress.phase = CrawlPhase::Stopping;
        }
        info!("crawl stop requested");
        Ok(())
    }

    pub fn phase(&self) -> CrawlPhase {
        self.state.lock().unwrap().progress.phase
    }

    pub fn progress(&self) -> CrawlProgress {
        self.state.lock().unwrap().progress.clone()
    }

    /// Reserve the session for a new run, rejecting concurrent starts.
    fn claim_start(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        if state.progress.phase.is_active() {
            return Err(CrawlError::AlreadyRunning);
        }
        state.progress = CrawlProgress {
            phase: CrawlPhase::Running,
            ..CrawlProgress::default()
        };
        state.stop_requested = false;
        state.last_item_count = 0;
        Ok(())
    }

    fn release_start(&self) {
        let mut state = self.state.lock().unwrap();
        state.progress.phase = CrawlPhase::Idle;
    }

    fn spawn_poll_loop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.poll_running {
                return;
            }
            state.poll_running = true;
        }
        tokio::spawn(self.clone().run_poll_loop());
    }

    async fn run_poll_loop(self) {
        loop {
            sleep(self.interval).await;

            let report = match self.backend.crawler_status().await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "crawler status request failed, will retry");
                    continue;
                }
            };

            let (merge, finished) = {
                let mut state = self.state.lock().unwrap();
                let phase = resolve_phase(state.stop_requested, &report);
                state.progress = CrawlProgress {
                    phase,
                    progress: report.progress,
                    current_keyword: report.current_keyword.clone(),
                    processed_keywords: report.processed_keywords,
                    total_keywords: report.total_keywords,
                    discovered: report.videos.len(),
                    error: report.error.clone(),
                };

                let merge = if report.videos.len() > state.last_item_count {
                    state.last_item_count = report.videos.len();
                    true
                } else {
                    false
                };

                let finished = !phase.is_active();
                if finished {
                    state.poll_running = false;
                    state.stop_requested = false;
                }
                (merge, finished)
            };

            if merge {
                self.catalog.upsert_from_search(report.videos);
            }
            if finished {
                info!(phase = ?self.phase(), "crawl poll loop finished");
                return;
            }
        }
    }
}

/// Phase resolution table. The status report is authoritative; the local
/// stop flag only disambiguates why the crawler is (or will be) stopped.
fn resolve_phase(stop_requested: bool, report: &CrawlerStatusReport) -> CrawlPhase {
    if report.is_running {
        if stop_requested {
            CrawlPhase::Stopping
        } else if report.is_paused {
            CrawlPhase::Paused
        } else {
            CrawlPhase::Running
        }
    } else if stop_requested {
        CrawlPhase::Idle
    } else if report.error.is_some() {
        CrawlPhase::Failed
    } else if report.progress >= 100.0 {
        CrawlPhase::Completed
    } else {
        CrawlPhase::Idle
    }
}
