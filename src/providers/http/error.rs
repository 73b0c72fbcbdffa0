use std::time::Duration;

use thiserror::Error;

use crate::providers::ProviderError;

/// Errors from the cluster REST API.
///
/// SECURITY: Error messages must NEVER contain the API token.
#[derive(Debug, Error)]
pub enum HttpClusterError {
    /// Token rejected (401/403)
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection failed, timed out, etc.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("resource not found: '{resource}'")]
    NotFound { resource: String },

    /// Response body did not match the envelope or resource schema
    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

impl HttpClusterError {
    pub fn is_transient(&self) -> bool {
        match self {
            HttpClusterError::Network(_) | HttpClusterError::RateLimited { .. } => true,
            HttpClusterError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<HttpClusterError> for ProviderError {
    fn from(err: HttpClusterError) -> Self {
        if let HttpClusterError::RateLimited { retry_after } = err {
            return ProviderError::Throttled {
                message: err.to_string(),
                retry_after: Duration::from_secs(retry_after),
            };
        }
        if err.is_transient() {
            return ProviderError::Transient(err.to_string());
        }
        match err {
            HttpClusterError::Auth { .. } => ProviderError::Auth(err.to_string()),
            _ => ProviderError::Rejected(err.to_string()),
        }
    }
}
