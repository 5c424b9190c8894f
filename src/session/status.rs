//! Session lifecycle states.
//!
//! `Idle` and `Starting` only ever exist on the client. Everything past
//! `Starting` is reported by the backend and lives in [`ServerStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// States the backend reports for a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    LoggingIn,
    Scraping,
    Processing,
    Completed,
    Error,
}

impl ServerStatus {
    /// Parse a wire status. Client-only or unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "logging_in" => Some(ServerStatus::LoggingIn),
            "scraping" => Some(ServerStatus::Scraping),
            "processing" => Some(ServerStatus::Processing),
            "completed" => Some(ServerStatus::Completed),
            "error" => Some(ServerStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::LoggingIn => "logging_in",
            ServerStatus::Scraping => "scraping",
            ServerStatus::Processing => "processing",
            ServerStatus::Completed => "completed",
            ServerStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerStatus::Completed | ServerStatus::Error)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Full client-side status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// No session has been started
    #[default]
    Idle,
    /// A start call is in flight or succeeded and no poll has answered yet
    Starting,
    /// Driven by the backend from here on
    Remote(ServerStatus),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Remote(s) if s.is_terminal())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Remote(s) => s.as_str(),
        }
    }

    pub fn server(&self) -> Option<ServerStatus> {
        match self {
            SessionStatus::Remote(s) => Some(*s),
            _ => None,
        }
    }
}

impl From<ServerStatus> for SessionStatus {
    fn from(status: ServerStatus) -> Self {
        SessionStatus::Remote(status)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
