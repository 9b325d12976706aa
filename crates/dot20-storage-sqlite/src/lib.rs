//! SQLite storage for the dot-20 indexer
//!
//! Provides the WAL-mode database wrapper, versioned schema migrations,
//! per-tick table materialization, token-state repository functions usable
//! both at connection level and inside transactions or savepoints, and
//! indexer-cursor persistence with SQLITE_BUSY retry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod status;

pub use database::Database;
pub use error::{Error, Result};
pub use models::{DeployInfo, HistoryRow, IndexerStatusRow};
pub use repository::Repository;
pub use status::{IndexerStatusStore, BASE_BACKOFF_MS, MAX_BACKOFF_MS, MAX_BUSY_RETRIES};
