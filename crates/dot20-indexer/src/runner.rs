//! Finalized-head polling loop
//!
//! Single-task cooperative loop: poll the finalized head, and once the
//! configured lag is satisfied, pull the next block's remarks through
//! filter → classify → apply. The cursor advances durably inside the
//! applier; the in-memory height only moves after that commit returns, so
//! a failed block is simply retried on the next turn.

use crate::apply::Applier;
use crate::classify::classify_remarks;
use crate::client::RemarkSource;
use crate::filter::base_filter_remarks;
use crate::tick_cache::TickModeCache;
use crate::Result;
use dot20_engine::Dot20Engine;
use dot20_storage_sqlite::Database;
use std::time::Duration;

/// Backoff after transport errors before reconnecting.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Poll interval while waiting for the head to outrun the lag gate.
pub const IDLE_POLL_DELAY: Duration = Duration::from_secs(3);

/// The indexer's main loop.
pub struct Runner<S, E> {
    source: S,
    engine: E,
    db: Database,
    cache: TickModeCache,
    next_block: u64,
    delay_blocks: u64,
}

impl<S: RemarkSource, E: Dot20Engine> Runner<S, E> {
    /// Create a runner that will process `next_block` first.
    pub fn new(source: S, engine: E, db: Database, next_block: u64, delay_blocks: u64) -> Self {
        Self {
            source,
            engine,
            db,
            cache: TickModeCache::new(),
            next_block,
            delay_blocks,
        }
    }

    /// Next block the runner will attempt.
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Run forever, retrying the same block on any failure.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.step().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(IDLE_POLL_DELAY).await,
                Err(e) if e.is_transport() => {
                    tracing::warn!("disconnected, reconnecting: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(block = self.next_block, "block application failed: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// One loop turn. Returns `Ok(true)` when a block was applied and the
    /// cursor advanced, `Ok(false)` when the lag gate is not satisfied yet.
    pub async fn step(&mut self) -> Result<bool> {
        let head = self.source.finalized_head_number().await?;
        if self.next_block + self.delay_blocks > head {
            return Ok(false);
        }

        tracing::debug!(block = self.next_block, head, "crawling extrinsics");
        let remarks = self.source.remarks_at(self.next_block).await?;
        tracing::debug!(block = self.next_block, count = remarks.len(), "got remarks");

        let filtered =
            base_filter_remarks(self.db.conn(), &self.engine, &mut self.cache, remarks)?;
        let classified = classify_remarks(&self.cache, filtered);
        Applier::new(&mut self.db, &self.engine).apply_block(self.next_block, classified)?;

        self.next_block += 1;
        Ok(true)
    }
}
