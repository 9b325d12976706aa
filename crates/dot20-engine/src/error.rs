//! Error types
//!
//! The split between protocol (domain) errors and storage errors drives the
//! pipeline's rollback scope: a domain error loses only the enclosing
//! savepoint, a storage error aborts the whole block transaction.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tick has no deploy record
    #[error("Tick not deployed: {0}")]
    NotDeployed(String),

    /// Tick already has a deploy record
    #[error("Tick already deployed: {0}")]
    AlreadyDeployed(String),

    /// Owner-mode mint from an account other than the deployer
    #[error("Not the tick owner: {0}")]
    NotOwner(String),

    /// Normal-mode mint above the tick's per-mint cap
    #[error("Mint limit exceeded: {0}")]
    MintLimitExceeded(String),

    /// Mint would push supply past the tick's maximum
    #[error("Max supply exceeded: {0}")]
    SupplyExceeded(String),

    /// Debit larger than the account balance
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Allowance spend larger than the remaining grant
    #[error("Insufficient allowance: {0}")]
    InsufficientAllowance(String),

    /// Payload routed to the wrong engine operation
    #[error("Unexpected op: {0}")]
    UnexpectedOp(String),

    /// Payload failed structural validation
    #[error("Payload error: {0}")]
    Payload(#[from] dot20_core::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] dot20_storage_sqlite::Error),
}

impl Error {
    /// Storage errors abort the outer transaction; everything else is a
    /// domain error that costs at most the enclosing savepoint.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.into())
    }
}
