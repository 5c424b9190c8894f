//! API error types for the scraping backend

use std::fmt;

/// Errors that can occur when talking to the scraping backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection refused, DNS failure or timeout
    NetworkError { message: String },
    /// Non-2xx HTTP response
    HttpError { status: u16, message: String },
    /// The backend answered `success: false`
    Rejected { message: String },
    /// Response body did not match the expected shape
    DecodeError { message: String },
}

impl ApiError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            status,
            message: message.into(),
        }
    }

    /// Create a rejection carrying the backend's own message
    pub fn rejected(message: impl Into<String>) -> Self {
        ApiError::Rejected {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::DecodeError {
            message: message.into(),
        }
    }

    /// Check if retrying the same request later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::NetworkError { .. } => true,
            ApiError::HttpError { status, .. } => *status >= 500 || *status == 429,
            ApiError::Rejected { .. } | ApiError::DecodeError { .. } => false,
        }
    }

    /// Message safe to show to a user: no status codes or transport details
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message } if !message.is_empty() => message.clone(),
            ApiError::Rejected { .. } => "The scraping service rejected the request".to_string(),
            ApiError::NetworkError { .. } => "Could not reach the scraping service".to_string(),
            ApiError::HttpError { .. } | ApiError::DecodeError { .. } => {
                "The scraping service returned an unexpected response".to_string()
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NetworkError { message } => write!(f, "Network error - {}", message),
            ApiError::HttpError { status, message } => write!(f, "HTTP {} - {}", status, message),
            ApiError::Rejected { message } => write!(f, "Rejected by backend - {}", message),
            ApiError::DecodeError { message } => write!(f, "Invalid response - {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient() {
        assert!(ApiError::network("timeout").is_transient());
        assert!(ApiError::http(503, "unavailable").is_transient());
        assert!(ApiError::http(429, "slow down").is_transient());
        assert!(!ApiError::http(404, "missing").is_transient());
        assert!(!ApiError::rejected("bad password").is_transient());
        assert!(!ApiError::decode("eof").is_transient());
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = ApiError::http(502, "<html>Bad Gateway</html>");
        assert!(!err.user_message().contains("502"));
        assert!(!err.user_message().contains("html"));

        let err = ApiError::network("tcp connect error: 127.0.0.1:8000");
        assert!(!err.user_message().contains("127.0.0.1"));
    }

    #[test]
    fn test_user_message_passes_backend_rejection_through() {
        let err = ApiError::rejected("Email not registered with Greenhouse");
        assert_eq!(err.user_message(), "Email not registered with Greenhouse");

        let err = ApiError::rejected("");
        assert_eq!(
            err.user_message(),
            "The scraping service rejected the request"
        );
    }

    #[test]
    fn test_display() {
        let err = ApiError::http(500, "boom");
        assert_eq!(err.to_string(), "HTTP 500 - boom");

        let err = ApiError::network("connection refused");
        assert_eq!(err.to_string(), "Network error - connection refused");
    }
}
