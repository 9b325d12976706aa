//! Error types for the indexer pipeline

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure talking to the chain
    #[error("Network error: {0}")]
    Network(String),

    /// Connected node is not the configured chain
    #[error("Chain mismatch: {0}")]
    Chain(String),

    /// Bad or missing configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Pipeline invariant violated
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Transport errors trigger the runner's reconnect-and-retry path.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl From<dot20_storage_sqlite::Error> for Error {
    fn from(e: dot20_storage_sqlite::Error) -> Self {
        Error::Storage(format!("{}", e))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(format!("{}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(format!("{}", e))
    }
}

/// Map an engine failure on a fatal path (deploy-info fetch, cursor write)
/// to the pipeline error that decides the rollback scope.
pub fn fatal_engine_error(e: dot20_engine::Error) -> Error {
    if e.is_storage() {
        Error::Storage(format!("{}", e))
    } else {
        Error::Invariant(format!("{}", e))
    }
}
