//! Session controller: owns the one active session and its poll loop.
//!
//! Status transitions past `starting` come from the backend. The controller
//! only enforces that terminal states stop polling, that `end_time` is set
//! once, and that a new session always replaces the previous poll loop.
//! Replacing a session abandons client-side tracking only; the earlier
//! remote job keeps running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::model::{MergeOutcome, Session};
use super::status::ServerStatus;
use super::verification::VerificationListener;
use crate::api::{ApiError, ProgressSnapshot, ScraperApi, StartRequest, VerificationRequest};
use crate::config::Config;
use crate::results::ResultsSnapshot;
use crate::services::{PollControl, PollHandle, ProgressPoller, SnapshotSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a session is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartStrategy {
    /// Shared demo account from configuration
    Demo,
    Credentials { email: String, password: String },
    /// Submit an already-received email verification code
    Verification { email: String, code: String },
}

impl StartStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            StartStrategy::Demo => "demo",
            StartStrategy::Credentials { .. } => "credentials",
            StartStrategy::Verification { .. } => "verification",
        }
    }
}

/// Start failures. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{}", .0.user_message())]
    Api(ApiError),
    #[error("The scraping service did not return a session id")]
    MissingSessionId,
    /// Another start replaced this one while it was in flight
    #[error("A newer session was started")]
    Superseded,
}

/// Notifications for whatever front end is rendering the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session record changed (new session, adopted id, or poll merge)
    Updated(Session),
    StartFailed { message: String },
    /// The backend reported `completed` or `error`; polling has stopped
    Finished(Session),
    /// Successful run with scraped jobs; open the results view
    ResultsReady(ResultsSnapshot),
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub max_jobs: u32,
    pub demo_email: String,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_jobs: config.scraping.max_jobs,
            demo_email: config.scraping.demo_email.clone(),
        }
    }
}

/// State shared between the controller and its poll loop
struct Tracker {
    session: Mutex<Option<Session>>,
    last_error: Mutex<Option<String>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Tracker {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }

    fn replace(&self, session: Option<Session>) {
        *lock(&self.session) = session.clone();
        if let Some(session) = session {
            self.emit(SessionEvent::Updated(session));
        }
    }

    fn local_id(&self) -> Option<Uuid> {
        lock(&self.session).as_ref().map(|s| s.local_id)
    }
}

impl SnapshotSink for Tracker {
    fn apply(&self, session_id: &str, snapshot: ProgressSnapshot) -> PollControl {
        let (outcome, updated) = {
            let mut guard = lock(&self.session);
            let Some(session) = guard.as_mut() else {
                return PollControl::Stop;
            };
            if session.id.as_deref() != Some(session_id) {
                debug!(session_id, "Dropping snapshot for abandoned session");
                return PollControl::Stop;
            }
            let outcome = session.apply_snapshot(&snapshot, Utc::now());
            (outcome, session.clone())
        };

        self.emit(SessionEvent::Updated(updated.clone()));

        match outcome {
            MergeOutcome::Running => PollControl::Continue,
            MergeOutcome::AlreadyFinished => PollControl::Stop,
            MergeOutcome::Finished(status) => {
                match status {
                    ServerStatus::Error => warn!(
                        session_id,
                        message = %updated.message,
                        "Scraping session failed"
                    ),
                    _ => info!(
                        session_id,
                        jobs_scraped = updated.jobs_scraped,
                        total_jobs = updated.total_jobs,
                        "Scraping session completed"
                    ),
                }
                let results = updated.wants_results().then(|| updated.results_snapshot());
                self.emit(SessionEvent::Finished(updated));
                if let Some(results) = results {
                    self.emit(SessionEvent::ResultsReady(results));
                }
                PollControl::Stop
            }
        }
    }
}

pub struct SessionController {
    api: Arc<dyn ScraperApi>,
    settings: ControllerSettings,
    tracker: Arc<Tracker>,
    poller: ProgressPoller,
    poll: Mutex<Option<PollHandle>>,
}

impl SessionController {
    pub fn new(
        api: Arc<dyn ScraperApi>,
        settings: ControllerSettings,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let poller = ProgressPoller::new(api.clone(), settings.poll_interval);
        Self {
            api,
            settings,
            tracker: Arc::new(Tracker {
                session: Mutex::new(None),
                last_error: Mutex::new(None),
                events,
            }),
            poller,
            poll: Mutex::new(None),
        }
    }

    /// Copy of the active session, if any
    pub fn session(&self) -> Option<Session> {
        lock(&self.tracker.session).clone()
    }

    pub fn has_session(&self) -> bool {
        lock(&self.tracker.session).is_some()
    }

    /// True while a poll loop is armed and has not stopped on its own
    pub fn is_polling(&self) -> bool {
        lock(&self.poll).as_ref().is_some_and(PollHandle::is_active)
    }

    /// Message from the most recent failed start
    pub fn last_error(&self) -> Option<String> {
        lock(&self.tracker.last_error).clone()
    }

    /// Start a new session, replacing any session currently tracked.
    ///
    /// Returns the backend session id. On failure the session is cleared
    /// back to idle and the error message is kept in [`last_error`].
    ///
    /// [`last_error`]: SessionController::last_error
    #[instrument(skip(self, strategy), fields(strategy = strategy.kind()))]
    pub async fn start(&self, strategy: StartStrategy) -> Result<String, StartError> {
        if let Err(err) = validate(&strategy) {
            self.fail(&err);
            return Err(err);
        }

        self.stop();
        *lock(&self.tracker.last_error) = None;
        let session = Session::starting(Utc::now());
        let local_id = session.local_id;
        self.tracker.replace(Some(session));

        let result = match &strategy {
            StartStrategy::Demo => {
                self.api
                    .start_session(&StartRequest {
                        email: self.settings.demo_email.clone(),
                        password: None,
                        max_jobs: self.settings.max_jobs,
                    })
                    .await
            }
            StartStrategy::Credentials { email, password } => {
                self.api
                    .start_session(&StartRequest {
                        email: email.clone(),
                        password: Some(password.clone()),
                        max_jobs: self.settings.max_jobs,
                    })
                    .await
            }
            StartStrategy::Verification { email, code } => {
                self.api
                    .start_with_verification(&VerificationRequest {
                        email: email.clone(),
                        verification_code: Some(code.clone()),
                        max_jobs: self.settings.max_jobs,
                    })
                    .await
            }
        };

        if self.tracker.local_id() != Some(local_id) {
            debug!("Start superseded while awaiting the backend");
            return Err(StartError::Superseded);
        }

        let started = result.map_err(StartError::Api).and_then(|response| {
            let session_id = response
                .session_id
                .filter(|id| !id.is_empty())
                .ok_or(StartError::MissingSessionId)?;
            Ok((session_id, response.message.unwrap_or_default()))
        });

        match started {
            Ok((session_id, message)) => {
                info!(session_id = %session_id, %local_id, "Scraping session started");
                self.begin_polling(local_id, session_id.clone(), message);
                Ok(session_id)
            }
            Err(err) => {
                self.tracker.replace(None);
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Track a session some other flow already started (verification
    /// handoff). No start call is made.
    #[instrument(skip(self, initial_message))]
    pub fn adopt_session(&self, session_id: String, initial_message: String) {
        self.stop();
        *lock(&self.tracker.last_error) = None;
        let session = Session::starting(Utc::now());
        let local_id = session.local_id;
        self.tracker.replace(Some(session));
        info!(%local_id, "Adopting scraping session");
        self.begin_polling(local_id, session_id, initial_message);
    }

    /// Halt polling. The session record and its status are left as they are.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.poll).take() {
            debug!(session_id = handle.session_id(), "Stopping progress polling");
        }
    }

    /// Single place a poll loop is armed; always tears down the previous one
    fn begin_polling(&self, local_id: Uuid, session_id: String, message: String) {
        let mut slot = lock(&self.poll);
        slot.take();

        let adopted = {
            let mut guard = lock(&self.tracker.session);
            match guard.as_mut() {
                Some(session) if session.local_id == local_id => {
                    session.adopt(session_id.clone(), message);
                    Some(session.clone())
                }
                _ => None,
            }
        };
        let Some(adopted) = adopted else {
            debug!("Session replaced before polling could begin");
            return;
        };
        self.tracker.emit(SessionEvent::Updated(adopted));

        let sink: Arc<dyn SnapshotSink> = self.tracker.clone();
        *slot = Some(self.poller.spawn(session_id, sink));
    }

    fn fail(&self, err: &StartError) {
        let message = err.to_string();
        warn!(error = %message, "Failed to start scraping session");
        *lock(&self.tracker.last_error) = Some(message.clone());
        self.tracker.emit(SessionEvent::StartFailed { message });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl VerificationListener for SessionController {
    fn on_verification_complete(&self, session_id: &str, message: &str) {
        self.adopt_session(session_id.to_string(), message.to_string());
    }

    fn on_cancel(&self) {
        info!("Email verification cancelled");
    }
}

fn validate(strategy: &StartStrategy) -> Result<(), StartError> {
    match strategy {
        StartStrategy::Demo => Ok(()),
        StartStrategy::Credentials { email, password } => {
            if email.trim().is_empty() {
                Err(StartError::InvalidInput("Email is required".to_string()))
            } else if password.is_empty() {
                Err(StartError::InvalidInput("Password is required".to_string()))
            } else {
                Ok(())
            }
        }
        StartStrategy::Verification { email, code } => {
            if email.trim().is_empty() {
                Err(StartError::InvalidInput("Email is required".to_string()))
            } else if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
                Err(StartError::InvalidInput(
                    "Verification code must be 6 digits".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }
}
