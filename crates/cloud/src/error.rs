//! Error types for the remote catalog client.

use thiserror::Error;

/// Errors produced while building, executing or materializing catalog queries.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    /// Error reported by the catalog service itself (`{"error": {...}}` body).
    #[error("remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Evaluation failure inside the in-memory backend.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The filtered collection matched no images.
    #[error("input collection is empty")]
    EmptyCollection,

    #[error("row {row}: cannot flatten polarisation: {reason}")]
    Polarisation { row: usize, reason: String },

    #[error("core error: {0}")]
    Core(#[from] s1tilex_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
