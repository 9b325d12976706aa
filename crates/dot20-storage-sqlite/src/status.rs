//! Indexer cursor persistence with retry/backoff for SQLITE_BUSY
//!
//! The cursor row is written in two ways: standalone (startup bootstrap,
//! with contention retry) and inside the block's outer transaction via
//! [`upsert_status_tx`], which is how the atomic cursor-advance contract is
//! implemented.

use crate::models::IndexerStatusRow;
use crate::{Error, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for SQLITE_BUSY
pub const MAX_BUSY_RETRIES: u32 = 5;

/// Base backoff duration in milliseconds
pub const BASE_BACKOFF_MS: u64 = 50;

/// Maximum backoff duration in milliseconds
pub const MAX_BACKOFF_MS: u64 = 1000;

/// Indexer status storage operations with retry logic
pub struct IndexerStatusStore<'a> {
    conn: &'a Connection,
}

impl<'a> IndexerStatusStore<'a> {
    /// Create new status store
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load the cursor row for a protocol.
    pub fn get(&self, protocol: &str) -> Result<Option<IndexerStatusRow>> {
        self.query_with_retry(|| {
            let row = self
                .conn
                .query_row(
                    r#"
                    SELECT protocol, indexer_height, crawler_height, updated_at
                    FROM indexer_status
                    WHERE protocol = ?1
                    "#,
                    [protocol],
                    |row| {
                        Ok(IndexerStatusRow {
                            protocol: row.get(0)?,
                            indexer_height: row.get::<_, i64>(1)? as u64,
                            crawler_height: row.get::<_, i64>(2)? as u64,
                            updated_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert or update the cursor row with retry on SQLITE_BUSY.
    pub fn upsert(&self, protocol: &str, indexer_height: u64, crawler_height: u64) -> Result<()> {
        self.execute_with_retry(|| {
            upsert_status_tx(self.conn, protocol, indexer_height, crawler_height)
        })
    }

    /// Execute with retry logic for SQLITE_BUSY
    fn execute_with_retry<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(()) => return Ok(()),
                Err(Error::Database(ref e)) if is_busy_error(e) && attempts < MAX_BUSY_RETRIES => {
                    attempts += 1;
                    let backoff = calculate_backoff(attempts);
                    tracing::debug!(
                        "SQLITE_BUSY (attempt {}/{}), retrying in {}ms",
                        attempts,
                        MAX_BUSY_RETRIES,
                        backoff
                    );
                    thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Query with retry logic for SQLITE_BUSY
    fn query_with_retry<F, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(result) => return Ok(result),
                Err(Error::Database(ref e)) if is_busy_error(e) && attempts < MAX_BUSY_RETRIES => {
                    attempts += 1;
                    let backoff = calculate_backoff(attempts);
                    tracing::debug!(
                        "SQLITE_BUSY (attempt {}/{}), retrying in {}ms",
                        attempts,
                        MAX_BUSY_RETRIES,
                        backoff
                    );
                    thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Insert or update the cursor row on the caller's connection handle.
/// Inside the Applier's outer transaction this is what makes cursor advance
/// atomic with the block's state changes.
pub fn upsert_status_tx(
    conn: &Connection,
    protocol: &str,
    indexer_height: u64,
    crawler_height: u64,
) -> Result<()> {
    let updated_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO indexer_status (protocol, indexer_height, crawler_height, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(protocol) DO UPDATE SET
            indexer_height = ?2,
            crawler_height = ?3,
            updated_at = ?4
        "#,
        params![protocol, indexer_height as i64, crawler_height as i64, updated_at],
    )?;

    Ok(())
}

/// Check if error is SQLITE_BUSY
fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: ErrorCode::DatabaseBusy,
                ..
            },
            _
        )
    )
}

/// Calculate exponential backoff with jitter
fn calculate_backoff(attempt: u32) -> u64 {
    let base = BASE_BACKOFF_MS * (1 << attempt.min(6));
    let jitter = rand::random::<u64>() % (base / 4 + 1);
    (base + jitter).min(MAX_BACKOFF_MS)
}
