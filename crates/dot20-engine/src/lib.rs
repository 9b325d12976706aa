//! dot-20 execution engine
//!
//! Validates operation payloads and applies deploy/mint/transfer/approve/
//! transferFrom against the sqlite store. Every state-mutating method runs
//! on a caller-supplied connection handle, so the indexer decides the
//! transactional scope (outer transaction, savepoint) around each call.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;

pub use engine::{Dot20Engine, SqliteDot20Engine};
pub use error::{Error, Result};
