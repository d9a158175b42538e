use thiserror::Error;

/// Reasons a message or origin was rejected.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid origin {origin}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("opaque origin: {0}")]
    OpaqueOrigin(String),

    #[error("not a player event")]
    NotPlayerEvent,

    #[error("envelope has no data")]
    MissingData,

    #[error("malformed envelope: {0}")]
    Malformed(String),
}
