//! The fixed scraping pipeline and its projection from server reports.
//!
//! The pipeline is presentational only: overall progress and the current
//! step always come from the backend verbatim, never from these steps.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::ServerStep;

/// The six pipeline phases, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Init,
    Login,
    Navigate,
    Scrape,
    Process,
    Complete,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::Init,
        StepId::Login,
        StepId::Navigate,
        StepId::Scrape,
        StepId::Process,
        StepId::Complete,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Init => "init",
            StepId::Login => "login",
            StepId::Navigate => "navigate",
            StepId::Scrape => "scrape",
            StepId::Process => "process",
            StepId::Complete => "complete",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepId::Init => "Initializing",
            StepId::Login => "Logging in",
            StepId::Navigate => "Opening job board",
            StepId::Scrape => "Scraping postings",
            StepId::Process => "Processing results",
            StepId::Complete => "Complete",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Error,
}

impl StepStatus {
    /// Parse a wire step status, accepting the synonyms the backend has used
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "waiting" => Some(StepStatus::Pending),
            "active" | "in_progress" | "running" => Some(StepStatus::Active),
            "completed" | "complete" | "done" => Some(StepStatus::Completed),
            "error" | "failed" => Some(StepStatus::Error),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            StepStatus::Pending => "○",
            StepStatus::Active => "◐",
            StepStatus::Completed => "●",
            StepStatus::Error => "✗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub label: String,
    pub status: StepStatus,
    #[serde(default)]
    pub percent: Option<u8>,
}

impl Step {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            label: id.label().to_string(),
            status: StepStatus::Pending,
            percent: None,
        }
    }
}

/// The six-step pipeline with every step pending
pub fn default_pipeline() -> Vec<Step> {
    StepId::ALL.into_iter().map(Step::new).collect()
}

/// Clamp a server-reported percentage into `0..=100`
pub(crate) fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 100.0) as u8
    }
}

/// Merge server step reports into the local pipeline by step id.
///
/// Template order and length are preserved. Steps the server did not report
/// keep their prior status; unknown server ids and unparseable statuses are
/// ignored. If the server repeats an id, the last report wins.
pub fn project(template: &[Step], server_steps: &[ServerStep]) -> Vec<Step> {
    template
        .iter()
        .map(|step| {
            let mut step = step.clone();
            if let Some(report) = server_steps
                .iter()
                .rev()
                .find(|s| s.id == step.id.as_str())
            {
                if let Some(status) = StepStatus::parse(&report.status) {
                    step.status = status;
                }
                if let Some(progress) = report.progress {
                    step.percent = Some(clamp_percent(progress));
                }
            }
            step
        })
        .collect()
}

/// Everything a front end needs to draw progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressModel {
    pub steps: Vec<Step>,
    pub overall_percent: u8,
    pub current_step: StepId,
}
