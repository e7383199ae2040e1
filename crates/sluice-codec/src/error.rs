use thiserror::Error;

/// Errors returned by protocol payload codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization/deserialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Header block did not follow the `NATS/1.0` line format.
    #[error("invalid header block: {0}")]
    InvalidHeaderBlock(&'static str),
}
