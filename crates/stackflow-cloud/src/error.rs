//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
///
/// Providers classify every failure. [`CloudError::is_retryable`] tells the
/// engine whether another attempt may succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl CloudError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::RateLimited(_) | CloudError::Unavailable(_) | CloudError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
