//! Generic repeated-status-request primitive.
//!
//! One polling loop per job id. The next request is only issued after the
//! previous one resolves, so updates for a job are observed in order.
//! Transport failures are retried forever with a fixed back-off: a job is
//! only finished when the backend reports a terminal status.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backend::BackendError;

/// Spawns and tracks per-job polling loops. Cheap to clone; all clones
/// share the same set of active loops.
#[derive(Clone)]
pub struct StatusPoller {
    active: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
    retry_backoff: Duration,
}

impl StatusPoller {
    pub fn new(retry_backoff: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            retry_backoff,
        }
    }

    /// Start a polling loop for `job_id`. Returns false without doing
    /// anything when a loop for that id is already live, so repeated starts
    /// never produce duplicate request streams.
    ///
    /// `fetch` issues one status request, `on_update` consumes each
    /// successful report, `is_terminal` decides when to stop and
    /// `interval_for` picks the delay before the next request based on the
    /// last report.
    pub fn spawn<R, Fetch, Fut, Update, Terminal, Interval>(
        &self,
        job_id: &str,
        fetch: Fetch,
        mut on_update: Update,
        is_terminal: Terminal,
        interval_for: Interval,
    ) -> bool
    where
        R: Send + 'static,
        Fetch: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, BackendError>> + Send,
        Update: FnMut(&R) + Send + 'static,
        Terminal: Fn(&R) -> bool + Send + 'static,
        Interval: Fn(&R) -> Duration + Send + 'static,
    {
        let mut cancel_rx = {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(job_id) {
                debug!(job_id, "poll loop already running");
                return false;
            }
            let (tx, rx) = watch::channel(false);
            active.insert(job_id.to_string(), tx);
            rx
        };

        let job_id = job_id.to_string();
        let active = Arc::clone(&self.active);
        let retry_backoff = self.retry_backoff;

        tokio::spawn(async move {
            debug!(job_id = %job_id, "poll loop started");
            loop {
                let delay = match fetch().await {
                    Ok(report) => {
                        let terminal = is_terminal(&report);
                        on_update(&report);
                        if terminal {
                            debug!(job_id = %job_id, "job reached terminal status");
                            break;
                        }
                        interval_for(&report)
                    }
                    Err(e) if e.is_transport() => {
                        warn!(job_id = %job_id, error = %e, "status request failed, will retry");
                        retry_backoff
                    }
                    Err(e) => {
                        // The backend itself rejected the status request;
                        // there is nothing left to poll.
                        warn!(job_id = %job_id, error = %e, "backend refused status request");
                        break;
                    }
                };

                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            debug!(job_id = %job_id, "poll loop cancelled");
                            break;
                        }
                    }
                    _ = sleep(delay) => {}
                }
            }
            active.lock().unwrap().remove(&job_id);
        });

        true
    }

    /// Ask the loop for `job_id` to stop after its in-flight request, if
    /// any. Unknown ids are ignored.
    pub fn cancel(&self, job_id: &str) {
        if let Some(tx) = self.active.lock().unwrap().get(job_id) {
            let _ = tx.send(true);
        }
    }

    /// Stop every live loop.
    pub fn shutdown(&self) {
        for tx in self.active.lock().unwrap().values() {
            let _ = tx.send(true);
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.active.lock().unwrap().contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn fast_poller() -> StatusPoller {
        StatusPoller::new(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let poller = fast_poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let fetch_calls = Arc::clone(&calls);
        let started = poller.spawn(
            "job-1",
            move || {
                let n = fetch_calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            },
            move |report: &bool| {
                let _ = done_tx.send(*report);
            },
            |report| *report,
            |_| Duration::from_millis(5),
        );
        assert!(started);

        let mut updates = Vec::new();
        while let Some(update) = done_rx.recv().await {
            let terminal = update;
            updates.push(update);
            if terminal {
                break;
            }
        }
        assert_eq!(updates, vec![false, false, true]);

        // The loop unregisters itself after the terminal update.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!poller.is_polling("job-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let poller = fast_poller();
        let calls = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let fetch_calls = Arc::clone(&calls);
        poller.spawn(
            "job-retry",
            move || {
                let n = fetch_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BackendError::Timeout)
                    } else {
                        Ok(())
                    }
                }
            },
            move |_report: &()| {
                let _ = done_tx.send(());
            },
            |_| true,
            |_| Duration::from_millis(5),
        );

        done_rx.recv().await.unwrap();
        // Two failed fetches then one successful terminal fetch; exactly
        // one update was delivered.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(done_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_is_idempotent_per_job_id() {
        let poller = fast_poller();
        let (never_tx, _never_rx) = mpsc::unbounded_channel::<()>();

        let first = poller.spawn(
            "job-dup",
            || async { Ok(()) },
            {
                let tx = never_tx.clone();
                move |_: &()| {
                    let _ = tx.send(());
                }
            },
            |_| false,
            |_| Duration::from_secs(60),
        );
        let second = poller.spawn(
            "job-dup",
            || async { Ok(()) },
            move |_: &()| {
                let _ = never_tx.send(());
            },
            |_| false,
            |_| Duration::from_secs(60),
        );

        assert!(first);
        assert!(!second);
        assert_eq!(poller.active_count(), 1);

        poller.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let poller = fast_poller();

        poller.spawn(
            "job-cancel",
            || async { Ok(()) },
            |_: &()| {},
            |_| false,
            |_| Duration::from_secs(60),
        );
        assert!(poller.is_polling("job-cancel"));

        poller.cancel("job-cancel");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!poller.is_polling("job-cancel"));

        // Cancelling an unknown id is a no-op.
        poller.cancel("job-unknown");
    }

    #[tokio::test]
    async fn test_api_error_ends_loop_without_update() {
        let poller = fast_poller();
        let updates = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&updates);
        poller.spawn(
            "job-gone",
            || async { Err(BackendError::Api("unknown task".into())) },
            move |_: &()| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            |_| false,
            |_| Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!poller.is_polling("job-gone"));
        assert_eq!(updates.load(Ordering::SeqCst), 0);
    }
}
