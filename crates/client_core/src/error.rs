use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Server-provided detail for status failures, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Status failures as the shared error shape, with the same
    /// `Server Error: {status}` fallback the backend's clients use.
    pub fn api_error(&self) -> Option<ApiError> {
        match self {
            ClientError::Status { status, detail } => Some(ApiError::new(
                ErrorCode::from_status(*status),
                detail
                    .clone()
                    .unwrap_or_else(|| format!("Server Error: {status}")),
            )),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
