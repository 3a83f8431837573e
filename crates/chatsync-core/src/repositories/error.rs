use thiserror::Error;

/// Error type for sync server requests
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Server returned status {status}")]
    ServerError { status: u16 },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ApiError {
    /// Transient failures worth another attempt after a backoff delay.
    /// A message may 404 briefly while the server finishes persisting it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::HttpError(_) | ApiError::NotFound(_) => true,
            ApiError::ServerError { status } => *status >= 500,
            ApiError::ParseError(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::ParseError(e.to_string())
        } else {
            ApiError::HttpError(e.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::NotFound("m1".into()).is_retryable());
        assert!(ApiError::HttpError("reset".into()).is_retryable());
        assert!(ApiError::ServerError { status: 503 }.is_retryable());
        assert!(!ApiError::ServerError { status: 403 }.is_retryable());
        assert!(!ApiError::ParseError("bad json".into()).is_retryable());
    }
}
