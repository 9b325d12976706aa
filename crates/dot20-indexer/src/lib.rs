//! dot-20 inscription indexer pipeline
//!
//! Follows finalized blocks of a substrate-based chain, extracts dot-20
//! remark candidates, and materializes token state into the sqlite store.
//! Per block the pipeline is filter → classify → apply: batch-level rule
//! enforcement, partition into deploys/mints/others, then application in
//! the transactional envelope that keeps cursor advance atomic with the
//! block's state changes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod apply;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod runner;
pub mod tick_cache;

pub use apply::Applier;
pub use classify::{classify_remarks, ClassifiedBlock};
pub use client::{RemarkSource, SidecarClient};
pub use config::Config;
pub use error::{Error, Result};
pub use filter::base_filter_remarks;
pub use runner::{Runner, IDLE_POLL_DELAY, RECONNECT_DELAY};
pub use tick_cache::TickModeCache;
