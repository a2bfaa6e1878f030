//! Tencent Cloud provider error types

use spotfleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TencentError {
    #[error("tccli not found. Please install: pip install tccli")]
    TccliNotFound,

    #[error("Tencent Cloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("tccli {action} failed: {message}")]
    CommandFailed { action: String, message: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unexpected response from {action}: {message}")]
    InvalidResponse { action: String, message: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl TencentError {
    pub(crate) fn invalid(action: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// Classify a failed tccli invocation by the SDK error code in its output
    pub(crate) fn from_stderr(action: &str, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        if message.contains("AuthFailure") {
            Self::AuthenticationFailed(message)
        } else if message.contains("ResourceNotFound") || message.contains("NoDataOfRecord") {
            Self::ResourceNotFound(message)
        } else {
            Self::CommandFailed {
                action: action.to_string(),
                message,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }
}

impl From<TencentError> for CloudError {
    fn from(err: TencentError) -> Self {
        match err {
            TencentError::TccliNotFound => CloudError::CommandFailed(err.to_string()),
            TencentError::AuthenticationFailed(msg) => CloudError::AuthenticationFailed(msg),
            TencentError::CommandFailed { .. } => CloudError::ApiError(err.to_string()),
            TencentError::ResourceNotFound(msg) => CloudError::ResourceNotFound(msg),
            TencentError::InvalidResponse { .. } => CloudError::InvalidResponse(err.to_string()),
            TencentError::JsonError(e) => CloudError::Json(e),
            TencentError::IoError(e) => CloudError::Io(e),
            TencentError::CloudError(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, TencentError>;
