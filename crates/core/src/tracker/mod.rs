//! Job lifecycle tracking.
//!
//! The tracker is the only mutator of observable task state: it submits
//! jobs, owns one polling loop per job id and folds each status report into
//! the task map. Terminal callbacks fire exactly once, after the map update,
//! with no lock held.

mod types;

pub use types::{Task, TaskKind, TaskStatus, TrackerError};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::backend::{
    BackendClient, BackendError, DownloadKind, DownloadPhase, DownloadStatusReport,
    TranscriptionOutcome, TranscriptionPhase, TranscriptionStatusReport,
};
use crate::config::PollingSettings;
use crate::poller::StatusPoller;

type TaskMap = Mutex<HashMap<String, Task>>;
type CallbackMap = Mutex<HashMap<String, Vec<Box<dyn FnOnce(&Task) + Send>>>>;

pub struct TaskTracker {
    backend: Arc<dyn BackendClient>,
    poller: StatusPoller,
    tasks: Arc<TaskMap>,
    callbacks: Arc<CallbackMap>,
    intervals: PollingSettings,
}

impl TaskTracker {
    pub fn new(backend: Arc<dyn BackendClient>, intervals: PollingSettings) -> Self {
        Self {
            backend,
            poller: StatusPoller::new(intervals.retry_backoff()),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            intervals,
        }
    }

    /// Submit download jobs for a selection. Blank ids are dropped; an
    /// all-blank selection is rejected before any request is made. Returns
    /// the server-issued job ids, aligned with the surviving items.
    pub async fn submit_download(
        &self,
        item_ids: &[String],
        kind: DownloadKind,
    ) -> Result<Vec<String>, TrackerError> {
        let items: Vec<String> = item_ids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if items.is_empty() {
            return Err(TrackerError::EmptySelection);
        }

        let job_ids = self.backend.submit_download(&items, kind).await?;
        // Job ids map 1:1 onto the submitted items; a count mismatch would
        // leave jobs untracked or items without a task.
        if job_ids.len() != items.len() {
            return Err(TrackerError::Backend(BackendError::Decode(format!(
                "expected {} task ids, got {}",
                items.len(),
                job_ids.len()
            ))));
        }
        info!(count = job_ids.len(), kind = kind.as_str(), "download jobs submitted");

        for (item_id, job_id) in items.iter().zip(job_ids.iter()) {
            self.tasks.lock().unwrap().insert(
                job_id.clone(),
                Task::pending(job_id, TaskKind::Download, item_id),
            );
            self.start_download_poll(job_id.clone());
        }
        Ok(job_ids)
    }

    /// Submit a transcription job. A cache hit resolves the task to
    /// completed synchronously, before this returns, and starts no poller.
    pub async fn submit_transcription(
        &self,
        item_id: &str,
        formats: &[String],
    ) -> Result<String, TrackerError> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(TrackerError::EmptySelection);
        }

        let outcome = self.backend.submit_transcription(item_id, formats).await?;
        match outcome {
            TranscriptionOutcome::Completed { job_id, report } => {
                info!(job_id = %job_id, "transcription resolved from cache");
                self.tasks.lock().unwrap().insert(
                    job_id.clone(),
                    Task::pending(&job_id, TaskKind::Transcription, item_id),
                );
                apply_transcription(&self.tasks, &self.callbacks, &job_id, &report);
                Ok(job_id)
            }
            TranscriptionOutcome::Accepted { job_id } => {
                info!(job_id = %job_id, "transcription job submitted");
                self.tasks.lock().unwrap().insert(
                    job_id.clone(),
                    Task::pending(&job_id, TaskKind::Transcription, item_id),
                );
                self.start_transcription_poll(job_id.clone());
                Ok(job_id)
            }
        }
    }

    fn start_download_poll(&self, job_id: String) {
        let backend = Arc::clone(&self.backend);
        let fetch_job = job_id.clone();
        let tasks = Arc::clone(&self.tasks);
        let callbacks = Arc::clone(&self.callbacks);
        let update_job = job_id.clone();
        let interval = self.intervals.download_interval();

        self.poller.spawn(
            &job_id,
            move || {
                let backend = Arc::clone(&backend);
                let job = fetch_job.clone();
                async move {
                    match backend.download_status(&job).await {
                        // A refusal means the job is gone on the backend;
                        // fold it into a terminal failure so waiters resolve.
                        Err(e) if !e.is_transport() => Ok(DownloadStatusReport {
                            status: DownloadPhase::Error,
                            progress: 0.0,
                            message: e.to_string(),
                        }),
                        other => other,
                    }
                }
            },
            move |report| apply_download(&tasks, &callbacks, &update_job, report),
            DownloadStatusReport::is_terminal,
            move |_| interval,
        );
    }

    fn start_transcription_poll(&self, job_id: String) {
        let backend = Arc::clone(&self.backend);
        let fetch_job = job_id.clone();
        let tasks = Arc::clone(&self.tasks);
        let callbacks = Arc::clone(&self.callbacks);
        let update_job = job_id.clone();
        let warmup = self.intervals.transcription_warmup_interval();
        let steady = self.intervals.transcription_interval();

        self.poller.spawn(
            &job_id,
            move || {
                let backend = Arc::clone(&backend);
                let job = fetch_job.clone();
                async move {
                    match backend.transcription_status(&job).await {
                        Err(e) if !e.is_transport() => Ok(TranscriptionStatusReport {
                            status: TranscriptionPhase::Error,
                            progress: 0.0,
                            message: e.to_string(),
                            text: None,
                            segments: None,
                            duration: None,
                        }),
                        other => other,
                    }
                }
            },
            move |report| apply_transcription(&tasks, &callbacks, &update_job, report),
            TranscriptionStatusReport::is_terminal,
            // Poll eagerly while the backend is still warming up.
            move |report: &TranscriptionStatusReport| match report.status {
                TranscriptionPhase::Starting | TranscriptionPhase::LoadingModel => warmup,
                _ => steady,
            },
        );
    }

    /// Register a callback for a job's terminal transition. Fires
    /// immediately when the job is already terminal.
    pub fn on_terminal(&self, job_id: &str, callback: impl FnOnce(&Task) + Send + 'static) {
        let tasks = self.tasks.lock().unwrap();
        match tasks.get(job_id).filter(|t| t.is_terminal()).cloned() {
            Some(task) => {
                drop(tasks);
                callback(&task);
            }
            None => {
                self.callbacks
                    .lock()
                    .unwrap()
                    .entry(job_id.to_string())
                    .or_default()
                    .push(Box::new(callback));
            }
        }
    }

    /// Wait for a job to reach a terminal status. Returns None for an
    /// unknown job id.
    pub async fn await_terminal(&self, job_id: &str) -> Option<Task> {
        if !self.tasks.lock().unwrap().contains_key(job_id) {
            return None;
        }
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_terminal(job_id, move |task| {
            let _ = tx.send(task.clone());
        });
        rx.await.ok()
    }

    pub fn task(&self, job_id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(job_id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.poller.is_polling(job_id)
    }

    /// Drop every task and stop every poll loop.
    pub fn clear(&self) {
        self.poller.shutdown();
        self.tasks.lock().unwrap().clear();
        self.callbacks.lock().unwrap().clear();
        debug!("task map cleared");
    }

    /// Drop terminal tasks, keeping live ones untouched.
    pub fn clear_finished(&self) {
        self.tasks.lock().unwrap().retain(|_, t| !t.is_terminal());
    }
}

fn apply_download(
    tasks: &TaskMap,
    callbacks: &CallbackMap,
    job_id: &str,
    report: &DownloadStatusReport,
) {
    let (snapshot, to_fire) = {
        let mut tasks = tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(job_id) else {
            return;
        };
        // Terminal tasks are immutable.
        if task.is_terminal() {
            return;
        }

        match report.status {
            DownloadPhase::Downloading | DownloadPhase::Unknown => {
                task.status = TaskStatus::Running
            }
            DownloadPhase::Completed => task.status = TaskStatus::Completed,
            DownloadPhase::Error => task.status = TaskStatus::Failed,
        }
        ratchet_progress(task, report.progress);
        task.message = report.message.clone();
        task.updated_at = Utc::now();

        let snapshot = task.clone();
        let to_fire = drain_if_terminal(callbacks, job_id, &snapshot);
        (snapshot, to_fire)
    };
    for cb in to_fire {
        cb(&snapshot);
    }
}

fn apply_transcription(
    tasks: &TaskMap,
    callbacks: &CallbackMap,
    job_id: &str,
    report: &TranscriptionStatusReport,
) {
    let (snapshot, to_fire) = {
        let mut tasks = tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(job_id) else {
            return;
        };
        if task.is_terminal() {
            return;
        }

        match report.status {
            TranscriptionPhase::Starting => task.status = TaskStatus::Pending,
            TranscriptionPhase::LoadingModel
            | TranscriptionPhase::Transcribing
            | TranscriptionPhase::Unknown => task.status = TaskStatus::Running,
            TranscriptionPhase::Completed => {
                task.status = TaskStatus::Completed;
                task.text = report.text.clone();
            }
            TranscriptionPhase::Error => task.status = TaskStatus::Failed,
        }
        ratchet_progress(task, report.progress);
        task.message = report.message.clone();
        task.updated_at = Utc::now();

        let snapshot = task.clone();
        let to_fire = drain_if_terminal(callbacks, job_id, &snapshot);
        (snapshot, to_fire)
    };
    for cb in to_fire {
        cb(&snapshot);
    }
}

/// Progress never moves backwards while a task is live; completion forces
/// it to 100 regardless of the last reported value.
fn ratchet_progress(task: &mut Task, reported: f64) {
    let clamped = reported.clamp(0.0, 100.0);
    if clamped > task.progress {
        task.progress = clamped;
    }
    if task.status == TaskStatus::Completed {
        task.progress = 100.0;
    }
}

fn drain_if_terminal(
    callbacks: &CallbackMap,
    job_id: &str,
    snapshot: &Task,
) -> Vec<Box<dyn FnOnce(&Task) + Send>> {
    if snapshot.is_terminal() {
        callbacks.lock().unwrap().remove(job_id).unwrap_or_default()
    } else {
        Vec::new()
    }
}
