//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Region client not found: {0}")]
    RegionNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Remote session error on {host}: {message}")]
    Remote { host: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn remote(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            host: host.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
