use thiserror::Error;

/// Errors produced while decoding realtime change payloads at the
/// subscription boundary.
#[derive(Error, Debug)]
pub enum EventDecodeError {
    #[error("Change payload is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Change event for unhandled table `{0}`")]
    UnknownTable(String),

    #[error("Unhandled change operation `{0}`")]
    UnknownOperation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
