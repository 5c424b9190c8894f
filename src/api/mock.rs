//! Scripted [`ScraperApi`] for tests.
//!
//! Responses are queued per endpoint and handed out in order. Every call is
//! recorded so tests can assert on what the orchestrator actually sent.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::ApiError;
use super::types::{
    JobListing, ProgressSnapshot, StartRequest, StartResponse, VerificationRequest,
};
use super::ScraperApi;

#[derive(Default)]
struct Script {
    starts: VecDeque<Result<StartResponse, ApiError>>,
    verifications: VecDeque<Result<StartResponse, ApiError>>,
    progress: VecDeque<Result<ProgressSnapshot, ApiError>>,
    /// Returned once `progress` runs dry, so long-running sessions can idle
    progress_fallback: Option<ProgressSnapshot>,
    jobs: Option<Result<Vec<JobListing>, ApiError>>,
    /// Simulated latency for every progress call
    progress_delay: Option<Duration>,
}

#[derive(Default)]
struct Calls {
    starts: Vec<StartRequest>,
    verifications: Vec<VerificationRequest>,
    progress: Vec<String>,
    /// (started, finished) per progress call, in start order
    progress_spans: Vec<(Instant, Option<Instant>)>,
    progress_in_flight: usize,
    progress_max_in_flight: usize,
    jobs: Vec<u32>,
}

/// Mock scraping backend
#[derive(Default)]
pub struct MockScraperApi {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

impl MockScraperApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful start returning `session_id`
    pub fn push_start_ok(&self, session_id: &str) {
        self.push_start(Ok(StartResponse {
            success: true,
            session_id: Some(session_id.to_string()),
            message: Some("Scraping started".to_string()),
            error: None,
        }));
    }

    pub fn push_start(&self, response: Result<StartResponse, ApiError>) {
        if let Ok(mut script) = self.script.lock() {
            script.starts.push_back(response);
        }
    }

    pub fn push_verification(&self, response: Result<StartResponse, ApiError>) {
        if let Ok(mut script) = self.script.lock() {
            script.verifications.push_back(response);
        }
    }

    pub fn push_progress(&self, response: Result<ProgressSnapshot, ApiError>) {
        if let Ok(mut script) = self.script.lock() {
            script.progress.push_back(response);
        }
    }

    /// Snapshot to return whenever the progress queue is empty
    pub fn set_progress_fallback(&self, snapshot: ProgressSnapshot) {
        if let Ok(mut script) = self.script.lock() {
            script.progress_fallback = Some(snapshot);
        }
    }

    /// Make every progress call take `delay` before answering
    pub fn set_progress_delay(&self, delay: Duration) {
        if let Ok(mut script) = self.script.lock() {
            script.progress_delay = Some(delay);
        }
    }

    pub fn set_jobs(&self, response: Result<Vec<JobListing>, ApiError>) {
        if let Ok(mut script) = self.script.lock() {
            script.jobs = Some(response);
        }
    }

    pub fn start_requests(&self) -> Vec<StartRequest> {
        self.calls
            .lock()
            .map(|c| c.starts.clone())
            .unwrap_or_default()
    }

    pub fn verification_requests(&self) -> Vec<VerificationRequest> {
        self.calls
            .lock()
            .map(|c| c.verifications.clone())
            .unwrap_or_default()
    }

    /// Session ids passed to `get_progress`, in call order
    pub fn progress_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.progress.clone())
            .unwrap_or_default()
    }

    pub fn progress_calls_for(&self, session_id: &str) -> usize {
        self.progress_calls()
            .iter()
            .filter(|id| id.as_str() == session_id)
            .count()
    }

    /// Start and end times of each progress call; `None` while in flight
    pub fn progress_spans(&self) -> Vec<(Instant, Option<Instant>)> {
        self.calls
            .lock()
            .map(|c| c.progress_spans.clone())
            .unwrap_or_default()
    }

    /// Highest number of progress calls that were ever running at once
    pub fn max_concurrent_progress(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.progress_max_in_flight)
            .unwrap_or_default()
    }

    pub fn jobs_calls(&self) -> Vec<u32> {
        self.calls
            .lock()
            .map(|c| c.jobs.clone())
            .unwrap_or_default()
    }
}

fn unscripted(endpoint: &str) -> ApiError {
    ApiError::network(format!("no scripted response for {}", endpoint))
}

#[async_trait]
impl ScraperApi for MockScraperApi {
    async fn start_session(&self, request: &StartRequest) -> Result<StartResponse, ApiError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.starts.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.starts.pop_front());
        next.unwrap_or_else(|| Err(unscripted("start")))?
            .into_result()
    }

    async fn start_with_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<StartResponse, ApiError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.verifications.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.verifications.pop_front());
        next.unwrap_or_else(|| Err(unscripted("verification")))?
            .into_result()
    }

    async fn get_progress(&self, session_id: &str) -> Result<ProgressSnapshot, ApiError> {
        let span = self.calls.lock().ok().map(|mut calls| {
            calls.progress.push(session_id.to_string());
            calls.progress_spans.push((Instant::now(), None));
            calls.progress_in_flight += 1;
            calls.progress_max_in_flight = calls
                .progress_max_in_flight
                .max(calls.progress_in_flight);
            calls.progress_spans.len() - 1
        });

        let delay = self.script.lock().ok().and_then(|s| s.progress_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let (Some(index), Ok(mut calls)) = (span, self.calls.lock()) {
            calls.progress_in_flight -= 1;
            calls.progress_spans[index].1 = Some(Instant::now());
        }

        let mut script = self
            .script
            .lock()
            .map_err(|_| ApiError::network("mock poisoned"))?;
        match script.progress.pop_front() {
            Some(response) => response,
            None => match &script.progress_fallback {
                Some(snapshot) => {
                    let mut snapshot = snapshot.clone();
                    snapshot.id = session_id.to_string();
                    Ok(snapshot)
                }
                None => Err(unscripted("progress")),
            },
        }
    }

    async fn list_jobs(&self, limit: u32) -> Result<Vec<JobListing>, ApiError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.jobs.push(limit);
        }
        self.script
            .lock()
            .ok()
            .and_then(|s| s.jobs.clone())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
