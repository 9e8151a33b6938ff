//! Error types for the device-management API client.

use serde::Deserialize;
use thiserror::Error;

/// Result type alias using `ApiError`.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while talking to the cloud API or its token endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token acquisition or validation failed. Never retried.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A request kept failing until the retry budget ran out.
    #[error("Fetch failed for {url} after {attempts} attempt(s): {message}")]
    Fetch {
        url: String,
        attempts: u32,
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("Request to {url} failed with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    /// Network-level failure (connect, timeout, TLS, ...).
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// The response could not be interpreted.
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// True for 5xx and network failures.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// `OData` error envelope returned by the API on failures.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataError {
    pub error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ODataErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Extracts a readable message from an error body, falling back to the raw text.
pub(crate) fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ODataError>(body) {
        Ok(odata) if odata.error.message.is_empty() => odata.error.code,
        Ok(odata) => format!("{} - {}", odata.error.code, odata.error.message),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
