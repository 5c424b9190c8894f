//! Progress Poller - fixed-interval polling of one remote session.
//!
//! - Sleeps one interval, polls, hands the snapshot to a sink, repeats
//! - Only one request is ever in flight: the next sleep starts after the
//!   previous poll has been fully handled
//! - Failed polls are logged and retried on the next tick
//! - The loop ends when the sink says so or when its [`PollHandle`] drops

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::{ProgressSnapshot, ScraperApi};

/// Whether the poll loop should keep going after a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Receives every successful poll result
pub trait SnapshotSink: Send + Sync {
    fn apply(&self, session_id: &str, snapshot: ProgressSnapshot) -> PollControl;
}

/// Capability for a running poll loop. Dropping it cancels the loop.
pub struct PollHandle {
    session_id: String,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// False once the loop stopped on its own (terminal status)
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns poll loops against a backend
#[derive(Clone)]
pub struct ProgressPoller {
    api: Arc<dyn ScraperApi>,
    interval: Duration,
}

impl ProgressPoller {
    pub fn new(api: Arc<dyn ScraperApi>, interval: Duration) -> Self {
        Self { api, interval }
    }

    /// Start polling `session_id`. Must be called within a tokio runtime.
    pub fn spawn(&self, session_id: String, sink: Arc<dyn SnapshotSink>) -> PollHandle {
        let api = self.api.clone();
        let interval = self.interval;
        let id = session_id.clone();
        let task = tokio::spawn(async move {
            run_poll_loop(api, interval, id, sink).await;
        });

        PollHandle { session_id, task }
    }
}

#[instrument(skip(api, sink), fields(interval_ms = interval.as_millis() as u64))]
async fn run_poll_loop(
    api: Arc<dyn ScraperApi>,
    interval: Duration,
    session_id: String,
    sink: Arc<dyn SnapshotSink>,
) {
    info!("Progress polling started");
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::time::sleep(interval).await;

        match api.get_progress(&session_id).await {
            Ok(snapshot) => {
                if consecutive_failures > 0 {
                    debug!(consecutive_failures, "Progress polling recovered");
                }
                consecutive_failures = 0;
                if sink.apply(&session_id, snapshot) == PollControl::Stop {
                    break;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    consecutive_failures,
                    transient = e.is_transient(),
                    error = %e,
                    "Progress poll failed, retrying next tick"
                );
            }
        }
    }

    info!("Progress polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MockScraperApi};
    use std::sync::Mutex;

    /// Records statuses and stops after a fixed number of snapshots
    struct CountingSink {
        seen: Mutex<Vec<String>>,
        stop_after: usize,
    }

    impl SnapshotSink for CountingSink {
        fn apply(&self, _session_id: &str, snapshot: ProgressSnapshot) -> PollControl {
            let mut seen = self.seen.lock().unwrap();
            seen.push(snapshot.status);
            if seen.len() >= self.stop_after {
                PollControl::Stop
            } else {
                PollControl::Continue
            }
        }
    }

    fn status(s: &str) -> ProgressSnapshot {
        ProgressSnapshot {
            id: "s1".to_string(),
            status: s.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_one_interval() {
        let api = Arc::new(MockScraperApi::new());
        api.set_progress_fallback(status("scraping"));
        let poller = ProgressPoller::new(api.clone(), Duration::from_secs(1));
        let sink = Arc::new(CountingSink {
            seen: Mutex::new(Vec::new()),
            stop_after: usize::MAX,
        });

        let _handle = poller.spawn("s1".to_string(), sink);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(api.progress_calls_for("s1"), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(api.progress_calls_for("s1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let api = Arc::new(MockScraperApi::new());
        api.push_progress(Err(ApiError::network("blip")));
        api.push_progress(Err(ApiError::http(502, "bad gateway")));
        api.push_progress(Ok(status("completed")));
        let poller = ProgressPoller::new(api.clone(), Duration::from_secs(1));
        let sink = Arc::new(CountingSink {
            seen: Mutex::new(Vec::new()),
            stop_after: 1,
        });

        let handle = poller.spawn("s1".to_string(), sink.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(api.progress_calls_for("s1"), 3);
        assert_eq!(*sink.seen.lock().unwrap(), vec!["completed".to_string()]);
        assert!(!handle.is_active());

        // Stopped loops stay stopped
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.progress_calls_for("s1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_loop() {
        let api = Arc::new(MockScraperApi::new());
        api.set_progress_fallback(status("scraping"));
        let poller = ProgressPoller::new(api.clone(), Duration::from_secs(1));
        let sink = Arc::new(CountingSink {
            seen: Mutex::new(Vec::new()),
            stop_after: usize::MAX,
        });

        let handle = poller.spawn("s1".to_string(), sink);
        assert_eq!(handle.session_id(), "s1");
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(api.progress_calls_for("s1"), 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.progress_calls_for("s1"), 2);
    }
}
