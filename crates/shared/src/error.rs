use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure surfaced by a candidate source. Never clears persisted decisions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("candidate source unreachable: {0}")]
    Transport(String),
    #[error("candidate source timed out")]
    Timeout,
    #[error("candidate source returned status {status}")]
    Status { status: u16 },
    #[error("malformed candidate payload: {0}")]
    Decode(String),
    #[error("no cached candidates available")]
    EmptyCache,
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Whether retrying the same fetch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout | FetchError::EmptyCache => true,
            FetchError::Status { status } => *status >= 500 || *status == 429,
            FetchError::Decode(_) | FetchError::Other(_) => false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::Transport(_) | FetchError::Timeout => ErrorCode::Unavailable,
            FetchError::Status { status: 429 } => ErrorCode::RateLimited,
            FetchError::Status { .. } | FetchError::Other(_) => ErrorCode::Internal,
            FetchError::Decode(_) => ErrorCode::Validation,
            FetchError::EmptyCache => ErrorCode::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    RateLimited,
    Unavailable,
    Internal,
}

/// Serializable form of an error, for front-ends that render status lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }
}

impl From<&FetchError> for ApiError {
    fn from(value: &FetchError) -> Self {
        Self::new(value.code(), value.to_string(), value.is_retryable())
    }
}
