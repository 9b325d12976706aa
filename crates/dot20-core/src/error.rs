//! Error types

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol model errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload failed structural validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Operation outside the supported taxonomy
    #[error("Unsupported op: {0}")]
    UnsupportedOp(String),

    /// Malformed or wrongly-checksummed SS58 address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
