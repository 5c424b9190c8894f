//! Integration tests for the session orchestrator
//!
//! These tests drive a `SessionController` against the scripted
//! `MockScraperApi` with tokio's paused clock, so a one second poll
//! interval costs no wall time.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test session_flow
//! ```

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use jobscout::api::{ApiError, MockScraperApi, ProgressSnapshot, ServerStep};
use jobscout::results::{self, ResultsView};
use jobscout::session::resume::{
    self, ResumeOutcome, StoredCredentials, AUTO_START_KEY, CREDENTIALS_KEY,
};
use jobscout::session::{
    ControllerSettings, SessionController, SessionEvent, SessionStatus, ServerStatus,
    StartStrategy, StepId, StepStatus, VerificationFlow, VerificationListener, VerificationStep,
};
use jobscout::state::{FileFlagStore, FlagStore, MemoryFlagStore};

// ─── Helpers ──────────────────────────────────────────────────────────────────

const TICK: Duration = Duration::from_secs(1);

struct Harness {
    api: Arc<MockScraperApi>,
    controller: Arc<SessionController>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn new() -> Self {
        let api = Arc::new(MockScraperApi::new());
        let (tx, events) = mpsc::unbounded_channel();
        let settings = ControllerSettings {
            poll_interval: TICK,
            max_jobs: 50,
            demo_email: "demo@example.com".to_string(),
        };
        let controller = Arc::new(SessionController::new(api.clone(), settings, tx));
        Self {
            api,
            controller,
            events,
        }
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn snapshot(id: &str, status: &str, progress: f64) -> ProgressSnapshot {
    ProgressSnapshot {
        id: id.to_string(),
        status: status.to_string(),
        progress,
        ..Default::default()
    }
}

/// Advance past the next poll tick
async fn tick() {
    tokio::time::sleep(TICK).await;
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_demo_happy_path() {
    let mut h = Harness::new();
    h.api.push_start_ok("s1");

    let mut scraping = snapshot("s1", "scraping", 40.0);
    scraping.current_step = Some("scrape".to_string());
    scraping.steps = vec![
        ServerStep::new("init", "completed"),
        ServerStep::new("login", "completed"),
        ServerStep::new("navigate", "completed"),
        ServerStep::new("scrape", "active"),
    ];
    h.api.push_progress(Ok(scraping));

    let mut done = snapshot("s1", "completed", 100.0);
    done.jobs_scraped = 12;
    done.total_jobs = 12;
    done.message = "Scraped 12 jobs".to_string();
    h.api.push_progress(Ok(done));

    let id = h.controller.start(StartStrategy::Demo).await.unwrap();
    assert_eq!(id, "s1");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let session = h.controller.session().unwrap();
    assert_eq!(session.status, SessionStatus::Remote(ServerStatus::Scraping));
    assert_eq!(session.progress, 40);
    assert_eq!(session.current_step, StepId::Scrape);
    assert_eq!(session.steps[3].status, StepStatus::Active);

    tick().await;
    let session = h.controller.session().unwrap();
    assert_eq!(session.status, SessionStatus::Remote(ServerStatus::Completed));
    assert_eq!(session.jobs_scraped, 12);
    assert!(session.end_time.is_some());
    assert!(!h.controller.is_polling());

    let results: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ResultsReady(snapshot) => Some(snapshot),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].jobs_scraped, 12);
    assert_eq!(results[0].session_id.as_deref(), Some("s1"));

    // Terminal stop: nothing more is polled
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.api.progress_calls_for("s1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_error_then_recovery() {
    let mut h = Harness::new();
    h.api.push_start_ok("s1");
    h.api.push_progress(Ok(snapshot("s1", "scraping", 10.0)));
    h.api.push_progress(Err(ApiError::network("connection reset")));
    h.api.set_progress_fallback(snapshot("s1", "scraping", 20.0));

    h.controller.start(StartStrategy::Demo).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.api.progress_calls_for("s1"), 2);
    let session = h.controller.session().unwrap();
    assert_eq!(session.status, SessionStatus::Remote(ServerStatus::Scraping));
    assert_eq!(session.progress, 10);
    assert!(h.controller.is_polling());
    assert_eq!(h.controller.last_error(), None);

    tick().await;
    assert_eq!(h.api.progress_calls_for("s1"), 3);
    assert_eq!(h.controller.session().unwrap().progress, 20);

    assert!(!h.drain().iter().any(|e| matches!(
        e,
        SessionEvent::StartFailed { .. } | SessionEvent::Finished(_)
    )));
}

#[tokio::test(start_paused = true)]
async fn test_single_active_poll_loop() {
    let h = Harness::new();
    h.api.push_start_ok("a");
    h.api.push_start_ok("b");
    h.api.set_progress_fallback(snapshot("", "scraping", 5.0));

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.api.progress_calls_for("a"), 2);

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    // A was torn down, B polls once per tick
    assert_eq!(h.api.progress_calls_for("a"), 2);
    assert_eq!(h.api.progress_calls_for("b"), 3);
    assert_eq!(h.controller.session().unwrap().id.as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_polls_never_overlap() {
    let h = Harness::new();
    let delay = Duration::from_millis(2500);
    h.api.push_start_ok("s1");
    h.api.set_progress_delay(delay);
    h.api.set_progress_fallback(snapshot("s1", "scraping", 5.0));

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Ticks at 1s, 4.5s and 8s: each waits for the previous answer plus one interval
    assert_eq!(h.api.progress_calls_for("s1"), 3);
    assert_eq!(h.api.max_concurrent_progress(), 1);

    let spans = h.api.progress_spans();
    for pair in spans.windows(2) {
        let (_, finished) = pair[0];
        let (next_started, _) = pair[1];
        let finished = finished.expect("earlier poll finished before the next one");
        assert!(next_started >= finished + TICK);
    }
    for (started, finished) in spans.iter().take(2) {
        assert!(finished.unwrap() - *started >= delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_time_is_set_once() {
    let h = Harness::new();
    h.api.push_start_ok("s1");
    h.api.set_progress_fallback(snapshot("s1", "completed", 100.0));

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let first = h.controller.session().unwrap().end_time;
    assert!(first.is_some());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.controller.session().unwrap().end_time, first);
    assert_eq!(h.api.progress_calls_for("s1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completed_without_jobs_skips_results() {
    let mut h = Harness::new();
    h.api.push_start_ok("s1");
    h.api.push_progress(Ok(snapshot("s1", "completed", 100.0)));

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Finished(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::ResultsReady(_))));
}

// ─── Auto-resume ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_auto_resume_starts_once_and_clears_flags() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileFlagStore::new(temp_dir.path().join("flags.json"));
    resume::arm(
        &store,
        &StoredCredentials {
            email: "a@b.com".to_string(),
            password: Some("x".to_string()),
            use_verification_code: false,
        },
    )
    .unwrap();

    let h = Harness::new();
    h.api.push_start(Err(ApiError::rejected("Invalid credentials")));

    let outcome = resume::resume_on_mount(&h.controller, &store).await;
    assert!(matches!(outcome, ResumeOutcome::Started(Err(_))));

    let requests = h.api.start_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].email, "a@b.com");
    assert_eq!(requests[0].password.as_deref(), Some("x"));

    assert_eq!(store.get(AUTO_START_KEY).unwrap(), None);
    assert_eq!(store.get(CREDENTIALS_KEY).unwrap(), None);

    // A second mount finds nothing to replay
    let again = Harness::new();
    let outcome = resume::resume_on_mount(&again.controller, &store).await;
    assert_eq!(outcome, ResumeOutcome::NotArmed);
    assert!(again.api.start_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_auto_resume_skipped_while_session_active() {
    let h = Harness::new();
    h.api.push_start_ok("s1");
    h.api.set_progress_fallback(snapshot("s1", "scraping", 0.0));
    h.controller.start(StartStrategy::Demo).await.unwrap();

    let store = MemoryFlagStore::new();
    store.set(AUTO_START_KEY, "true").unwrap();

    let outcome = resume::resume_on_mount(&h.controller, &store).await;
    assert_eq!(outcome, ResumeOutcome::Skipped);
    assert_eq!(store.get(AUTO_START_KEY).unwrap().as_deref(), Some("true"));
    assert_eq!(h.api.start_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_resume_verification_makes_no_call() {
    let h = Harness::new();
    let store = MemoryFlagStore::new();
    resume::arm(
        &store,
        &StoredCredentials {
            email: "a@b.com".to_string(),
            password: None,
            use_verification_code: true,
        },
    )
    .unwrap();

    let outcome = resume::resume_on_mount(&h.controller, &store).await;
    assert_eq!(
        outcome,
        ResumeOutcome::AwaitingVerification {
            email: "a@b.com".to_string()
        }
    );
    assert!(store.is_empty());
    assert!(h.api.start_requests().is_empty());
    assert!(h.api.verification_requests().is_empty());
}

// ─── Verification handoff ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_verification_hands_session_to_controller() {
    let h = Harness::new();
    h.api.push_verification(Ok(jobscout::api::StartResponse {
        success: true,
        session_id: None,
        message: Some("Code sent".to_string()),
        error: None,
    }));
    h.api.push_verification(Ok(jobscout::api::StartResponse {
        success: true,
        session_id: Some("v1".to_string()),
        message: Some("Verified, starting".to_string()),
        error: None,
    }));
    h.api.set_progress_fallback(snapshot("v1", "scraping", 15.0));

    let listener: Arc<dyn VerificationListener> = h.controller.clone();
    let mut flow = VerificationFlow::new(h.api.clone(), listener, 50);

    flow.request_code("a@b.com").await.unwrap();
    assert_eq!(flow.set_code_input("12a3b456c"), "123456");
    let code = flow.code().to_string();
    flow.submit_code("a@b.com", &code).await.unwrap();
    assert_eq!(flow.step(), VerificationStep::Processing);

    // Adopted without another start call
    assert!(h.api.start_requests().is_empty());
    let session = h.controller.session().unwrap();
    assert_eq!(session.id.as_deref(), Some("v1"));
    assert_eq!(session.message, "Verified, starting");
    assert!(h.controller.is_polling());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.api.progress_calls_for("v1"), 1);
    assert_eq!(h.controller.session().unwrap().progress, 15);
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_results_survive_until_viewed() {
    let mut h = Harness::new();
    h.api.push_start_ok("s1");
    let mut done = snapshot("s1", "completed", 100.0);
    done.jobs_scraped = 3;
    done.total_jobs = 5;
    h.api.push_progress(Ok(done));
    h.api.set_jobs(Err(ApiError::network("listing down")));

    h.controller.start(StartStrategy::Demo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let snapshot = h
        .drain()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::ResultsReady(snapshot) => Some(snapshot),
            _ => None,
        })
        .unwrap();

    let store = MemoryFlagStore::new();
    results::stash_pending(&store, &snapshot).unwrap();
    let pending = results::take_pending(&store).unwrap().unwrap();
    assert!(results::take_pending(&store).unwrap().is_none());

    let view = ResultsView::open(h.api.as_ref(), pending, 50).await;
    assert!(view.jobs.is_empty());
    assert!(view.render().contains("Jobs scraped: 3 of 5"));
}
