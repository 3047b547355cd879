use std::time::Duration;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("geocoding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("geocoding provider error: {0}")]
    Provider(String),
    #[error("{0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether a failed geocode attempt is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Http(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }
                err.status()
                    .map(|status| status.as_u16() == 429 || status.is_server_error())
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}
