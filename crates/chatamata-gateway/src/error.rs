use thiserror::Error;

/// Errors produced by the gateway layer.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// HTTP transport or body-decode failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform rejected the request.
    #[error("Gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Websocket transport failure.
    #[error("Realtime socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Auth endpoint failure or malformed token material.
    #[error("Auth error: {0}")]
    Auth(String),

    /// An authenticated call was made without a session token.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The realtime task is gone (channel closed).
    #[error("Realtime task is no longer running")]
    RealtimeClosed,

    /// JSON (de)serialization failure outside of HTTP bodies.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decode failure (JWT claims).
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Realtime change payload failed to decode.
    #[error("Change event decode error: {0}")]
    Event(#[from] chatamata_shared::EventDecodeError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
