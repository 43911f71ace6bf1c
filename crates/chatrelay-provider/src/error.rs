//! Error types for provider clients

use thiserror::Error;

/// Provider error types
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{provider} returned status {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("stream broke mid-flight: {0}")]
    Stream(String),

    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("request failed after retries: {0}")]
    Exhausted(String),
}

impl ProviderError {
    /// Whether retrying the request could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect() || err.is_timeout(),
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Api {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_are_retryable_by_status() {
        let retryable = ProviderError::Api {
            provider: "test".to_string(),
            status: 429,
            message: "rate limit".to_string(),
            retry_after_secs: Some(2),
        };
        let non_retryable = ProviderError::Api {
            provider: "test".to_string(),
            status: 401,
            message: "unauthorized".to_string(),
            retry_after_secs: None,
        };

        assert!(retryable.is_retryable());
        assert_eq!(retryable.retry_after(), Some(2));
        assert!(!non_retryable.is_retryable());
    }

    #[test]
    fn stream_errors_are_never_retryable() {
        assert!(!ProviderError::Stream("connection reset".to_string()).is_retryable());
    }
}
