use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Network, timeout or HTTP failure while talking to the renderer.
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Page loaded but the expected structure is absent (possible layout drift).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A normalized field violates its expected type or range.
    #[error("Validation error: {field} = {raw:?}")]
    Validation { field: &'static str, raw: String },

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Errors worth another attempt under the scraping retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Fetch(_) | AppError::Http(_) | AppError::Parse(_))
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, AppError::Fetch(_) | AppError::Http(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Persistence(_))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::Fetch("timed out".to_string())
    }
}
