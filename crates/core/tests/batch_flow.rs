//! Batch actions and the download-to-summary flow across components.

use std::sync::Arc;
use std::time::Duration;

use mediadeck_core::backend::{
    BackendError, DownloadKind, DownloadPhase, DownloadStatusReport, DownloadedEntry, FileEntry,
    TranscriptionPhase, TranscriptionStatusReport,
};
use mediadeck_core::catalog::CatalogStore;
use mediadeck_core::config::Config;
use mediadeck_core::deck::MediaDeck;
use mediadeck_core::testing::MockBackend;
use mediadeck_core::tracker::TaskStatus;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.polling.download_interval_ms = 5;
    config.polling.transcription_warmup_interval_ms = 5;
    config.polling.transcription_interval_ms = 5;
    config.polling.retry_backoff_ms = 5;
    config.queue.pacing_ms = 1;
    config.batch.summary_pacing_ms = 1;
    config.summarizer.api_key = "sk-test".to_string();
    config
}

fn deck(backend: Arc<MockBackend>) -> MediaDeck {
    MediaDeck::with_catalog(
        &fast_config(),
        backend,
        Arc::new(CatalogStore::in_memory()),
    )
}

fn downloading(progress: f64) -> DownloadStatusReport {
    DownloadStatusReport {
        status: DownloadPhase::Downloading,
        progress,
        message: String::new(),
    }
}

fn download_done() -> DownloadStatusReport {
    DownloadStatusReport {
        status: DownloadPhase::Completed,
        progress: 100.0,
        message: String::new(),
    }
}

fn transcript_done(text: &str) -> TranscriptionStatusReport {
    TranscriptionStatusReport {
        status: TranscriptionPhase::Completed,
        progress: 100.0,
        message: String::new(),
        text: Some(text.to_string()),
        segments: None,
        duration: None,
    }
}

fn audio_entry(item_id: &str) -> DownloadedEntry {
    DownloadedEntry {
        item_id: item_id.to_string(),
        title: format!("title {}", item_id),
        files: vec![FileEntry {
            name: format!("{}.m4a", item_id),
            size: 1000,
        }],
        has_audio: true,
        ..DownloadedEntry::default()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn batch_download_polls_every_job_to_terminal() {
    let backend = Arc::new(MockBackend::new());
    backend.script_download_status("BV1_audio", vec![downloading(30.0), download_done()]);
    backend.script_download_status("BV2_audio", vec![downloading(10.0), downloading(80.0), download_done()]);
    let deck = deck(backend.clone());

    let outcome = deck
        .batch
        .batch_download(&["BV1".to_string(), "BV2".to_string()], &[DownloadKind::Audio])
        .await
        .unwrap();
    assert_eq!(outcome.submitted, 2);

    let first = deck.tracker.await_terminal("BV1_audio").await.unwrap();
    let second = deck.tracker.await_terminal("BV2_audio").await.unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.progress, 100.0);

    // Polling stops once a job is terminal.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let calls = backend.download_status_calls("BV1_audio");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.download_status_calls("BV1_audio"), calls);
}

#[tokio::test]
async fn transport_failures_during_polling_are_retried_to_completion() {
    let backend = Arc::new(MockBackend::new());
    backend.script_download_status("BV1_audio", vec![downloading(50.0), download_done()]);
    let deck = deck(backend.clone());

    deck.batch
        .batch_download(&["BV1".to_string()], &[DownloadKind::Audio])
        .await
        .unwrap();
    backend.fail_next(BackendError::Timeout);

    let task = deck.tracker.await_terminal("BV1_audio").await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn storage_refresh_then_transcribe_then_summarize() {
    let backend = Arc::new(MockBackend::new());
    backend.set_downloads(vec![audio_entry("BV1"), audio_entry("BV2")]);
    backend.set_transcription_cache("BV1", transcript_done("first transcript"));
    backend.set_transcription_cache("BV2", transcript_done("second transcript"));
    backend.set_summary("a useful summary");
    let deck = deck(backend);

    // Storage facts flow into the catalog and make the items eligible.
    assert_eq!(deck.refresh_downloaded().await.unwrap(), 2);

    let selection = vec!["BV1".to_string(), "BV2".to_string()];
    let outcome = deck.batch.batch_transcribe(&selection).await.unwrap();
    assert_eq!(outcome.submitted, 2);

    let queue = deck.queue.clone();
    wait_until(move || queue.is_empty()).await;
    assert_eq!(
        deck.catalog.transcript("BV1").as_deref(),
        Some("first transcript")
    );

    // A second transcription pass skips everything.
    let repeat = deck.batch.batch_transcribe(&selection).await.unwrap();
    assert_eq!(repeat.submitted, 0);
    assert_eq!(repeat.skipped, 2);

    let summaries = deck.batch.batch_summarize(&selection).await.unwrap();
    assert_eq!(summaries.submitted, 2);
    assert_eq!(
        deck.catalog.detail("BV2").unwrap().summary.as_deref(),
        Some("a useful summary")
    );
}

#[tokio::test]
async fn failed_download_surfaces_in_the_task_map() {
    let backend = Arc::new(MockBackend::new());
    backend.script_download_status(
        "BV1_merged",
        vec![DownloadStatusReport {
            status: DownloadPhase::Error,
            progress: 0.0,
            message: "stream not available".to_string(),
        }],
    );
    let deck = deck(backend);

    deck.batch
        .batch_download(&["BV1".to_string()], &[DownloadKind::Merged])
        .await
        .unwrap();

    let task = deck.tracker.await_terminal("BV1_merged").await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message, "stream not available");

    // The failure stays visible until an explicit clear.
    assert!(deck.tracker.task("BV1_merged").is_some());
    deck.tracker.clear_finished();
    assert!(deck.tracker.task("BV1_merged").is_none());
}
