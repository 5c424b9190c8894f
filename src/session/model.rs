//! Client-side record of one remote scraping run

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::pipeline::{clamp_percent, default_pipeline, project, ProgressModel, Step, StepId};
use super::status::{ServerStatus, SessionStatus};
use crate::api::ProgressSnapshot;
use crate::results::ResultsSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Client-side id for log correlation, fixed at creation
    pub local_id: Uuid,
    /// Backend session id; `None` until a start call succeeds
    pub id: Option<String>,
    pub status: SessionStatus,
    pub progress: u8,
    pub current_step: StepId,
    pub steps: Vec<Step>,
    pub message: String,
    pub jobs_scraped: u32,
    pub total_jobs: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub screenshots_taken: Vec<String>,
    pub credentials_used: Option<Value>,
    pub user_credentials: Option<Value>,
    pub email_not_registered: bool,
}

/// What applying one snapshot did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Session is still running
    Running,
    /// This snapshot moved the session into a terminal status
    Finished(ServerStatus),
    /// Session was already terminal before this snapshot
    AlreadyFinished,
}

impl Session {
    /// Empty session with nothing started
    pub fn idle() -> Self {
        Self {
            local_id: Uuid::new_v4(),
            id: None,
            status: SessionStatus::Idle,
            progress: 0,
            current_step: StepId::Init,
            steps: default_pipeline(),
            message: String::new(),
            jobs_scraped: 0,
            total_jobs: 0,
            start_time: None,
            end_time: None,
            screenshots_taken: Vec::new(),
            credentials_used: None,
            user_credentials: None,
            email_not_registered: false,
        }
    }

    /// Fresh record created the moment a start is requested
    pub fn starting(now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Starting,
            start_time: Some(now),
            message: "Starting scraping session...".to_string(),
            ..Self::idle()
        }
    }

    /// Record a backend-assigned id: status `logging_in` on the `login` step
    pub fn adopt(&mut self, session_id: String, message: String) {
        self.id = Some(session_id);
        self.status = SessionStatus::Remote(ServerStatus::LoggingIn);
        self.current_step = StepId::Login;
        self.message = message;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a poll snapshot into this session.
    ///
    /// The server is authoritative for status, overall progress and the
    /// current step. Values the client cannot interpret keep the prior local
    /// value. `end_time` is only ever set once.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        let was_terminal = self.is_terminal();

        match ServerStatus::parse(&snapshot.status) {
            Some(status) => self.status = SessionStatus::Remote(status),
            None => debug!(
                session = %self.local_id,
                status = %snapshot.status,
                "Ignoring non-server status in snapshot"
            ),
        }

        self.progress = clamp_percent(snapshot.progress);
        if let Some(step) = snapshot.current_step.as_deref().and_then(StepId::parse) {
            self.current_step = step;
        }
        self.message.clone_from(&snapshot.message);
        self.jobs_scraped = snapshot.jobs_scraped;
        self.total_jobs = snapshot.total_jobs;
        self.steps = project(&self.steps, &snapshot.steps);

        if let Some(screenshots) = &snapshot.screenshots_taken {
            self.screenshots_taken.clone_from(screenshots);
        }
        if snapshot.credentials_used.is_some() {
            self.credentials_used.clone_from(&snapshot.credentials_used);
        }
        if snapshot.user_credentials.is_some() {
            self.user_credentials.clone_from(&snapshot.user_credentials);
        }
        if let Some(flag) = snapshot.email_not_registered {
            self.email_not_registered = flag;
        }

        match self.status.server() {
            Some(status) if status.is_terminal() => {
                if self.end_time.is_none() {
                    self.end_time = Some(now);
                }
                if was_terminal {
                    MergeOutcome::AlreadyFinished
                } else {
                    MergeOutcome::Finished(status)
                }
            }
            _ => MergeOutcome::Running,
        }
    }

    /// Whether a finished session should open the results view
    pub fn wants_results(&self) -> bool {
        self.status == SessionStatus::Remote(ServerStatus::Completed) && self.jobs_scraped > 0
    }

    /// Freeze the fields the results view shows
    pub fn results_snapshot(&self) -> ResultsSnapshot {
        ResultsSnapshot {
            session_id: self.id.clone(),
            jobs_scraped: self.jobs_scraped,
            total_jobs: self.total_jobs,
            status: self.status.server().unwrap_or(ServerStatus::Completed),
            message: self.message.clone(),
            screenshots_taken: self.screenshots_taken.clone(),
            credentials_used: self.credentials_used.clone(),
            user_credentials: self.user_credentials.clone(),
            email_not_registered: self.email_not_registered,
        }
    }

    pub fn progress_model(&self) -> ProgressModel {
        ProgressModel {
            steps: self.steps.clone(),
            overall_percent: self.progress,
            current_step: self.current_step,
        }
    }

    /// Time since start, frozen at `end_time` once finished
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }
}
