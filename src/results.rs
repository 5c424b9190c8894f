//! Results view shown after a session finishes successfully.
//!
//! The view works from a frozen [`ResultsSnapshot`], never from the live
//! session, and adds a capped listing fetched on open. A listing failure
//! degrades to an empty list so the snapshot still renders.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{JobListing, ScraperApi};
use crate::session::status::ServerStatus;
use crate::state::{FlagStore, StoreError};

/// One-shot flag telling the next front end to open the results view
pub const SHOW_RESULTS_KEY: &str = "showScrapingResultsModal";

/// Session fields captured at the moment success was detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    #[serde(default)]
    pub session_id: Option<String>,
    pub jobs_scraped: u32,
    pub total_jobs: u32,
    pub status: ServerStatus,
    pub message: String,
    #[serde(default)]
    pub screenshots_taken: Vec<String>,
    #[serde(default)]
    pub credentials_used: Option<Value>,
    #[serde(default)]
    pub user_credentials: Option<Value>,
    #[serde(default)]
    pub email_not_registered: bool,
}

/// Persist a snapshot so a later run can show it exactly once
pub fn stash_pending(store: &dyn FlagStore, snapshot: &ResultsSnapshot) -> Result<(), StoreError> {
    store.set(SHOW_RESULTS_KEY, &serde_json::to_string(snapshot)?)
}

/// Take the pending snapshot, clearing the flag whether or not it parses
pub fn take_pending(store: &dyn FlagStore) -> Result<Option<ResultsSnapshot>, StoreError> {
    let raw = store.get(SHOW_RESULTS_KEY)?;
    store.remove(SHOW_RESULTS_KEY)?;

    Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable pending results");
            None
        }
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub snapshot: ResultsSnapshot,
    pub jobs: Vec<JobListing>,
}

impl ResultsView {
    /// Open the view: fetch up to `limit` listings alongside the snapshot
    pub async fn open(api: &dyn ScraperApi, snapshot: ResultsSnapshot, limit: u32) -> Self {
        let jobs = match api.list_jobs(limit).await {
            Ok(mut jobs) => {
                jobs.truncate(limit as usize);
                debug!(count = jobs.len(), "Loaded job listing for results");
                jobs
            }
            Err(e) => {
                warn!(error = %e, "Job listing unavailable, showing snapshot only");
                Vec::new()
            }
        };

        Self { snapshot, jobs }
    }

    /// Plain-text report for terminal output
    pub fn render(&self) -> String {
        let s = &self.snapshot;
        let mut out = String::new();

        let _ = writeln!(out, "Scraping {}", s.status);
        if !s.message.is_empty() {
            let _ = writeln!(out, "  {}", s.message);
        }
        let _ = writeln!(out, "  Jobs scraped: {} of {}", s.jobs_scraped, s.total_jobs);
        if s.email_not_registered {
            let _ = writeln!(out, "  Note: the email used is not registered on the job board");
        }
        if let Some(email) = s
            .credentials_used
            .as_ref()
            .and_then(|c| c.get("email"))
            .and_then(Value::as_str)
        {
            let _ = writeln!(out, "  Account: {}", email);
        }
        if !s.screenshots_taken.is_empty() {
            let _ = writeln!(out, "  Screenshots:");
            for shot in &s.screenshots_taken {
                let _ = writeln!(out, "    - {}", shot);
            }
        }

        if self.jobs.is_empty() {
            let _ = writeln!(out, "\nNo job listings to show.");
        } else {
            let _ = writeln!(out, "\nLatest jobs ({}):", self.jobs.len());
            for job in &self.jobs {
                let title = job.title.as_deref().unwrap_or("(untitled)");
                let mut line = format!("  • {}", title);
                if let Some(company) = &job.company {
                    let _ = write!(line, " - {}", company);
                }
                if let Some(location) = &job.location {
                    let _ = write!(line, " ({})", location);
                }
                let _ = writeln!(out, "{}", line);
                if let Some(url) = &job.url {
                    let _ = writeln!(out, "    {}", url);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MockScraperApi};
    use crate::state::MemoryFlagStore;

    fn snapshot() -> ResultsSnapshot {
        ResultsSnapshot {
            session_id: Some("s1".to_string()),
            jobs_scraped: 12,
            total_jobs: 12,
            status: ServerStatus::Completed,
            message: "Scraped 12 jobs".to_string(),
            screenshots_taken: vec!["final.png".to_string()],
            credentials_used: Some(serde_json::json!({"email": "a@b.com"})),
            user_credentials: None,
            email_not_registered: false,
        }
    }

    fn job(title: &str) -> JobListing {
        JobListing {
            title: Some(title.to_string()),
            company: Some("Acme".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_fetches_capped_listing() {
        let api = MockScraperApi::new();
        api.set_jobs(Ok(vec![job("A"), job("B"), job("C")]));

        let view = ResultsView::open(&api, snapshot(), 2).await;

        assert_eq!(api.jobs_calls(), vec![2]);
        assert_eq!(view.jobs.len(), 2);
        assert_eq!(view.snapshot.jobs_scraped, 12);
    }

    #[tokio::test]
    async fn test_listing_failure_degrades_to_empty() {
        let api = MockScraperApi::new();
        api.set_jobs(Err(ApiError::http(500, "db down")));

        let view = ResultsView::open(&api, snapshot(), 50).await;

        assert!(view.jobs.is_empty());
        let text = view.render();
        assert!(text.contains("Jobs scraped: 12 of 12"));
        assert!(text.contains("No job listings"));
    }

    #[test]
    fn test_render_includes_diagnostics_and_jobs() {
        let view = ResultsView {
            snapshot: snapshot(),
            jobs: vec![job("Rust Engineer")],
        };
        let text = view.render();
        assert!(text.contains("Scraping completed"));
        assert!(text.contains("Account: a@b.com"));
        assert!(text.contains("final.png"));
        assert!(text.contains("Rust Engineer - Acme"));
    }

    #[test]
    fn test_pending_results_are_one_shot() {
        let store = MemoryFlagStore::new();
        stash_pending(&store, &snapshot()).unwrap();

        assert_eq!(take_pending(&store).unwrap(), Some(snapshot()));
        assert_eq!(take_pending(&store).unwrap(), None);
    }

    #[test]
    fn test_unreadable_pending_results_are_cleared() {
        let store = MemoryFlagStore::new();
        store.set(SHOW_RESULTS_KEY, "true").unwrap();

        assert_eq!(take_pending(&store).unwrap(), None);
        assert!(store.is_empty());
    }
}
