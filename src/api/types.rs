//! Wire types for the scraping backend.
//!
//! Field names follow the backend's snake_case JSON exactly. Status strings
//! are kept as strings here and interpreted by the session model, so one
//! unexpected value does not fail a whole poll.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::ApiError;

/// Body for demo and credential starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub email: String,
    /// Absent for demo sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub max_jobs: u32,
}

/// Body for both halves of the email verification protocol.
///
/// `verification_code` is always serialized: `null` asks the backend to send
/// a code, a value submits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub email: String,
    pub verification_code: Option<String>,
    pub max_jobs: u32,
}

/// Response to any start call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartResponse {
    /// Turn `success: false` into an error carrying the backend's explanation
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(ApiError::rejected(
                self.error.or(self.message).unwrap_or_default(),
            ))
        }
    }
}

/// Envelope for the progress endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub success: bool,
    #[serde(default)]
    pub session: Option<ProgressSnapshot>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressResponse {
    pub fn into_snapshot(self) -> Result<ProgressSnapshot, ApiError> {
        match (self.success, self.session) {
            (true, Some(session)) => Ok(session),
            (true, None) => Err(ApiError::decode("progress response without session")),
            (false, _) => Err(ApiError::rejected(
                self.error.or(self.message).unwrap_or_default(),
            )),
        }
    }
}

/// Server-side view of a scraping session at one point in time.
///
/// Scalar fields accept `null` as their default, and counters accept
/// whole-number floats, so a sloppy payload still merges instead of failing
/// every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: f64,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub jobs_scraped: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_jobs: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<ServerStep>,
    #[serde(default)]
    pub screenshots_taken: Option<Vec<String>>,
    #[serde(default)]
    pub credentials_used: Option<Value>,
    #[serde(default)]
    pub user_credentials: Option<Value>,
    #[serde(default)]
    pub email_not_registered: Option<bool>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Non-negative count sent as an integer, a float, or `null`
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or_default();
    if raw.is_finite() && raw > 0.0 {
        Ok(raw.round().min(f64::from(u32::MAX)) as u32)
    } else {
        Ok(0)
    }
}

/// One pipeline step as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStep {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl ServerStep {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            progress: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsResponse {
    #[serde(default)]
    pub jobs: Vec<JobListing>,
}

/// A scraped posting from the listing endpoint. Unknown fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
