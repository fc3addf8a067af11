use thiserror::Error;

use chatamata_gateway::GatewayError;

/// Errors produced by the synchronizer layer.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A remote call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The input was rejected before any remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation that needs a session was called without one.
    #[error("Not signed in")]
    NotSignedIn,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
