//! Domain error types.

use thiserror::Error;

/// Errors raised while validating redemption input.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A claim in the batch is malformed.
    #[error("Invalid claim at position {position}: {reason}")]
    InvalidClaim { position: usize, reason: String },

    /// The request reference cannot address a backup blob.
    #[error("Invalid request reference: {0}")]
    InvalidReference(String),

    /// The batch carries no claims.
    #[error("Redemption batch is empty")]
    EmptyBatch,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
