//! Email one-time-code start: request a code, submit it, hand off.
//!
//! The flow never validates a code itself. It shapes input, relays the
//! backend's verdict, and on success passes the new session id to its
//! [`VerificationListener`]. It does not poll.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{ApiError, ScraperApi, VerificationRequest};

pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationStep {
    #[default]
    Email,
    Code,
    /// Code accepted; the listener owns the session from here
    Processing,
}

/// Receives the outcome of a verification flow
pub trait VerificationListener: Send + Sync {
    fn on_verification_complete(&self, session_id: &str, message: &str);
    fn on_cancel(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Email is required")]
    MissingEmail,
    #[error("Enter the 6-digit code from your email")]
    IncompleteCode,
    #[error("{0}")]
    Rejected(String),
    #[error("Request a code before submitting one")]
    WrongStep,
    #[error("The scraping service did not return a session id")]
    MissingSessionId,
}

impl From<ApiError> for VerificationError {
    fn from(err: ApiError) -> Self {
        VerificationError::Rejected(err.user_message())
    }
}

/// Keep digits only, truncated to the code length
pub fn sanitize_code(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(CODE_LENGTH)
        .collect()
}

pub struct VerificationFlow {
    api: Arc<dyn ScraperApi>,
    listener: Arc<dyn VerificationListener>,
    max_jobs: u32,
    step: VerificationStep,
    email: String,
    code: String,
    error: Option<String>,
    notice: Option<String>,
}

impl VerificationFlow {
    pub fn new(
        api: Arc<dyn ScraperApi>,
        listener: Arc<dyn VerificationListener>,
        max_jobs: u32,
    ) -> Self {
        Self {
            api,
            listener,
            max_jobs,
            step: VerificationStep::Email,
            email: String::new(),
            code: String::new(),
            error: None,
            notice: None,
        }
    }

    /// Prefill the email field (auto-resume surfaces the flow this way)
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn step(&self) -> VerificationStep {
        self.step
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Retryable message from the last failed call
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Backend message from the last successful call
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Store user input for the code field, sanitized as it is typed
    pub fn set_code_input(&mut self, raw: &str) -> &str {
        self.code = sanitize_code(raw);
        &self.code
    }

    /// Ask the backend to email a code. Stays on `Email` if that fails.
    #[instrument(skip(self))]
    pub async fn request_code(&mut self, email: &str) -> Result<(), VerificationError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(self.record(VerificationError::MissingEmail));
        }
        self.email = email.to_string();

        let request = VerificationRequest {
            email: self.email.clone(),
            verification_code: None,
            max_jobs: self.max_jobs,
        };
        match self.api.start_with_verification(&request).await {
            Ok(response) => {
                info!("Verification code requested");
                self.error = None;
                self.notice = response.message;
                self.code.clear();
                self.step = VerificationStep::Code;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Verification code request failed");
                Err(self.record(e.into()))
            }
        }
    }

    /// Submit a code. Success hands the new session to the listener;
    /// failure stays on `Code` so the user can retry.
    #[instrument(skip(self, code))]
    pub async fn submit_code(
        &mut self,
        email: &str,
        code: &str,
    ) -> Result<String, VerificationError> {
        if self.step != VerificationStep::Code {
            return Err(self.record(VerificationError::WrongStep));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(self.record(VerificationError::MissingEmail));
        }
        let code = sanitize_code(code);
        self.code.clone_from(&code);
        if code.len() != CODE_LENGTH {
            return Err(self.record(VerificationError::IncompleteCode));
        }
        self.email = email.to_string();

        let request = VerificationRequest {
            email: self.email.clone(),
            verification_code: Some(code),
            max_jobs: self.max_jobs,
        };
        let response = match self.api.start_with_verification(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Verification code rejected");
                return Err(self.record(e.into()));
            }
        };

        let Some(session_id) = response.session_id.filter(|id| !id.is_empty()) else {
            return Err(self.record(VerificationError::MissingSessionId));
        };
        let message = response.message.unwrap_or_default();

        info!(session_id = %session_id, "Verification accepted");
        self.error = None;
        self.notice = Some(message.clone());
        self.step = VerificationStep::Processing;
        self.listener.on_verification_complete(&session_id, &message);
        Ok(session_id)
    }

    /// Go back to the email step to use a different address
    pub fn change_email(&mut self) {
        if self.step == VerificationStep::Code {
            self.step = VerificationStep::Email;
            self.code.clear();
            self.error = None;
        }
    }

    /// Abandon the flow. Consumes it; nothing is kept afterwards.
    pub fn cancel(self) {
        self.listener.on_cancel();
    }

    fn record(&mut self, err: VerificationError) -> VerificationError {
        self.error = Some(err.to_string());
        err
    }
}
