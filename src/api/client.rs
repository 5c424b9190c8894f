//! HTTP implementation of [`ScraperApi`] against the scraping backend

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::ApiError;
use super::types::{
    JobListing, JobsResponse, ProgressResponse, ProgressSnapshot, StartRequest, StartResponse,
    VerificationRequest,
};
use super::ScraperApi;
use crate::config::Config;

/// reqwest-backed client for the scraping backend
pub struct HttpScraperApi {
    client: Client,
    base_url: String,
    start_path: String,
    verify_path: String,
    progress_path: String,
    jobs_path: String,
}

impl HttpScraperApi {
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("jobscout/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            start_path: config.api.start_path.clone(),
            verify_path: config.api.verify_path.clone(),
            progress_path: config.api.progress_path.clone(),
            jobs_path: config.api.jobs_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn progress_url(&self, session_id: &str) -> String {
        format!(
            "{}/{}",
            self.url(&self.progress_path).trim_end_matches('/'),
            session_id
        )
    }

    async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        Self::decode(response).await
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Backends often explain a 4xx with the same {success, message} envelope
            if let Ok(envelope) = serde_json::from_str::<StartResponse>(&body) {
                if let Some(message) = envelope.error.or(envelope.message) {
                    return Err(ApiError::rejected(message));
                }
            }
            return Err(ApiError::http(status.as_u16(), body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::decode(e.to_string()))
    }
}

#[async_trait]
impl ScraperApi for HttpScraperApi {
    async fn start_session(&self, request: &StartRequest) -> Result<StartResponse, ApiError> {
        let url = self.url(&self.start_path);
        debug!(url = %url, email = %request.email, "POST start");
        self.post_json::<_, StartResponse>(&url, request)
            .await?
            .into_result()
    }

    async fn start_with_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<StartResponse, ApiError> {
        let url = self.url(&self.verify_path);
        debug!(
            url = %url,
            email = %request.email,
            submitting_code = request.verification_code.is_some(),
            "POST verification"
        );
        self.post_json::<_, StartResponse>(&url, request)
            .await?
            .into_result()
    }

    async fn get_progress(&self, session_id: &str) -> Result<ProgressSnapshot, ApiError> {
        let url = self.progress_url(session_id);
        self.get_json::<ProgressResponse>(&url, &[])
            .await?
            .into_snapshot()
    }

    async fn list_jobs(&self, limit: u32) -> Result<Vec<JobListing>, ApiError> {
        let url = self.url(&self.jobs_path);
        let response: JobsResponse = self
            .get_json(&url, &[("limit", limit.to_string())])
            .await?;
        Ok(response.jobs)
    }
}
