use thiserror::Error;

use crate::models::Language;

#[derive(Debug, Error)]
pub enum TsukimiError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("{source_id} does not offer {language} playback")]
    UnsupportedLanguage {
        source_id: String,
        language: Language,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
