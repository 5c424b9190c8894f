//! Client side of the scraping backend's REST interface
//!
//! This module provides:
//! - The `ScraperApi` trait the orchestrator talks to
//! - An HTTP implementation and a scripted mock
//! - Wire types and error handling

use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::HttpScraperApi;
pub use error::ApiError;
pub use mock::MockScraperApi;
pub use types::{
    JobListing, ProgressSnapshot, ServerStep, StartRequest, StartResponse, VerificationRequest,
};

/// The four calls the orchestrator makes against the backend.
///
/// Implementations convert `success: false` envelopes into
/// [`ApiError::Rejected`], so an `Ok` is always a successful call.
#[async_trait]
pub trait ScraperApi: Send + Sync {
    /// Start a demo or credential session
    async fn start_session(&self, request: &StartRequest) -> Result<StartResponse, ApiError>;

    /// Request (`verification_code: None`) or submit an email verification code
    async fn start_with_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<StartResponse, ApiError>;

    /// Fetch the current snapshot of a running session
    async fn get_progress(&self, session_id: &str) -> Result<ProgressSnapshot, ApiError>;

    /// Fetch the first `limit` scraped postings
    async fn list_jobs(&self, limit: u32) -> Result<Vec<JobListing>, ApiError>;
}
