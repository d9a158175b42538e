use thiserror::Error;

/// Errors from the mapping metadata services.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no mapping for title {0}")]
    NotFound(u64),
}
