//! Token-state data access layer
//!
//! `Repository` borrows a bare [`rusqlite::Connection`], so the same
//! functions work at connection level, inside an outer transaction, or
//! inside a savepoint (`Transaction` and `Savepoint` both deref to
//! `Connection`). Transactional scope is owned by the caller.

use crate::models::{DeployInfo, HistoryRow};
use crate::{Error, Result};
use dot20_core::TickMode;
use rusqlite::{params, Connection, OptionalExtension};

/// Repository for token-state operations
pub struct Repository<'a> {
    conn: &'a Connection,
}

/// Reject ticks that cannot safely name a table. The allowlist already
/// bounds this in practice; the guard keeps dynamic DDL honest regardless.
fn check_table_tick(tick: &str) -> Result<()> {
    let ok = !tick.is_empty()
        && tick.len() <= 16
        && tick
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidTick(tick.to_string()))
    }
}

impl<'a> Repository<'a> {
    /// Create a repository over any connection-like handle.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Materialize the balance, allowance, and history tables for a newly
    /// deployed tick.
    pub fn create_tables_for_new_tick(&self, tick: &str) -> Result<()> {
        check_table_tick(tick)?;
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS balances_{tick} (
                address  TEXT PRIMARY KEY,
                balance  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS allowances_{tick} (
                owner    TEXT NOT NULL,
                spender  TEXT NOT NULL,
                amount   INTEGER NOT NULL,
                PRIMARY KEY (owner, spender)
            );

            CREATE TABLE IF NOT EXISTS history_{tick} (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                block_num        INTEGER NOT NULL,
                extrinsic_index  INTEGER NOT NULL,
                batchall_index   INTEGER NOT NULL,
                op               TEXT NOT NULL,
                origin           TEXT NOT NULL,
                counterparty     TEXT,
                amount           INTEGER,
                memo_remark      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_history_{tick}_block
                ON history_{tick} (block_num);
            "#,
        ))?;
        Ok(())
    }

    /// Fetch the deploy registry row for a tick.
    pub fn get_deploy_info(&self, tick: &str) -> Result<Option<DeployInfo>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT tick, mode, deployer, max_supply, mint_limit,
                       block_issuance, minted, deploy_block, created_at
                FROM deploys
                WHERE tick = ?1
                "#,
                [tick],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)? as u64,
                        row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                        row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
                        row.get::<_, i64>(6)? as u64,
                        row.get::<_, i64>(7)? as u64,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((
                tick,
                mode,
                deployer,
                max_supply,
                mint_limit,
                block_issuance,
                minted,
                deploy_block,
                created_at,
            )) => {
                let mode: TickMode = mode
                    .parse()
                    .map_err(|_| Error::Migration(format!("corrupt mode for tick {}", tick)))?;
                Ok(Some(DeployInfo {
                    tick,
                    mode,
                    deployer,
                    max_supply,
                    mint_limit,
                    block_issuance,
                    minted,
                    deploy_block,
                    created_at,
                }))
            }
        }
    }

    /// Insert the deploy registry row for a new tick.
    pub fn insert_deploy(&self, info: &DeployInfo) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO deploys
                (tick, mode, deployer, max_supply, mint_limit,
                 block_issuance, minted, deploy_block, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                info.tick,
                info.mode.as_str(),
                info.deployer,
                info.max_supply as i64,
                info.mint_limit.map(|v| v as i64),
                info.block_issuance.map(|v| v as i64),
                info.minted as i64,
                info.deploy_block as i64,
                info.created_at,
            ],
        )?;
        Ok(())
    }

    /// Add to a tick's minted-supply counter.
    pub fn add_minted(&self, tick: &str, amount: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE deploys SET minted = minted + ?2 WHERE tick = ?1",
            params![tick, amount as i64],
        )?;
        Ok(())
    }

    /// Current balance for an address under a tick (zero if absent).
    pub fn balance_of(&self, tick: &str, address: &str) -> Result<u64> {
        check_table_tick(tick)?;
        let balance = self
            .conn
            .query_row(
                &format!("SELECT balance FROM balances_{tick} WHERE address = ?1"),
                [address],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(balance.map(|v| v as u64).unwrap_or(0))
    }

    /// Credit an address.
    pub fn credit(&self, tick: &str, address: &str, amount: u64) -> Result<()> {
        check_table_tick(tick)?;
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO balances_{tick} (address, balance) VALUES (?1, ?2)
                ON CONFLICT(address) DO UPDATE SET balance = balance + ?2
                "#
            ),
            params![address, amount as i64],
        )?;
        Ok(())
    }

    /// Debit an address. Returns `false` (and changes nothing) when the
    /// balance is insufficient; the caller decides the error disposition.
    pub fn debit(&self, tick: &str, address: &str, amount: u64) -> Result<bool> {
        check_table_tick(tick)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE balances_{tick} SET balance = balance - ?2 \
                 WHERE address = ?1 AND balance >= ?2"
            ),
            params![address, amount as i64],
        )?;
        Ok(changed == 1)
    }

    /// Current allowance granted by `owner` to `spender` (zero if absent).
    pub fn allowance_of(&self, tick: &str, owner: &str, spender: &str) -> Result<u64> {
        check_table_tick(tick)?;
        let amount = self
            .conn
            .query_row(
                &format!(
                    "SELECT amount FROM allowances_{tick} WHERE owner = ?1 AND spender = ?2"
                ),
                [owner, spender],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(amount.map(|v| v as u64).unwrap_or(0))
    }

    /// Set (overwrite) an allowance grant.
    pub fn set_allowance(&self, tick: &str, owner: &str, spender: &str, amount: u64) -> Result<()> {
        check_table_tick(tick)?;
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO allowances_{tick} (owner, spender, amount) VALUES (?1, ?2, ?3)
                ON CONFLICT(owner, spender) DO UPDATE SET amount = ?3
                "#
            ),
            params![owner, spender, amount as i64],
        )?;
        Ok(())
    }

    /// Spend part of an allowance. Returns `false` (and changes nothing)
    /// when the remaining allowance is insufficient.
    pub fn spend_allowance(
        &self,
        tick: &str,
        owner: &str,
        spender: &str,
        amount: u64,
    ) -> Result<bool> {
        check_table_tick(tick)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE allowances_{tick} SET amount = amount - ?3 \
                 WHERE owner = ?1 AND spender = ?2 AND amount >= ?3"
            ),
            params![owner, spender, amount as i64],
        )?;
        Ok(changed == 1)
    }

    /// Append an applied operation to the tick's history table.
    pub fn insert_history(&self, tick: &str, row: &HistoryRow) -> Result<()> {
        check_table_tick(tick)?;
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO history_{tick}
                    (block_num, extrinsic_index, batchall_index, op,
                     origin, counterparty, amount, memo_remark)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#
            ),
            params![
                row.block_num as i64,
                row.extrinsic_index,
                row.batchall_index,
                row.op,
                row.origin,
                row.counterparty,
                row.amount.map(|v| v as i64),
                row.memo_remark,
            ],
        )?;
        Ok(())
    }

    /// Full history for a tick in application order.
    pub fn history(&self, tick: &str) -> Result<Vec<HistoryRow>> {
        check_table_tick(tick)?;
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT block_num, extrinsic_index, batchall_index, op,
                   origin, counterparty, amount, memo_remark
            FROM history_{tick}
            ORDER BY id
            "#
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HistoryRow {
                    block_num: row.get::<_, i64>(0)? as u64,
                    extrinsic_index: row.get(1)?,
                    batchall_index: row.get(2)?,
                    op: row.get(3)?,
                    origin: row.get(4)?,
                    counterparty: row.get(5)?,
                    amount: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
                    memo_remark: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All nonzero balances for a tick, largest first.
    pub fn balances(&self, tick: &str) -> Result<Vec<(String, u64)>> {
        check_table_tick(tick)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT address, balance FROM balances_{tick} \
             WHERE balance > 0 ORDER BY balance DESC, address"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn deploy_info(tick: &str, mode: TickMode) -> DeployInfo {
        DeployInfo {
            tick: tick.to_string(),
            mode,
            deployer: "alice".to_string(),
            max_supply: 1_000_000,
            mint_limit: Some(100),
            block_issuance: Some(1_000),
            minted: 0,
            deploy_block: 7,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_deploy_round_trip() {
        let db = test_db();
        let repo = Repository::new(db.conn());

        assert!(repo.get_deploy_info("dota").unwrap().is_none());
        repo.insert_deploy(&deploy_info("dota", TickMode::Fair)).unwrap();

        let info = repo.get_deploy_info("dota").unwrap().unwrap();
        assert_eq!(info.mode, TickMode::Fair);
        assert_eq!(info.max_supply, 1_000_000);
        assert_eq!(info.minted, 0);

        repo.add_minted("dota", 500).unwrap();
        let info = repo.get_deploy_info("dota").unwrap().unwrap();
        assert_eq!(info.minted, 500);
    }

    #[test]
    fn test_duplicate_deploy_rejected_by_schema() {
        let db = test_db();
        let repo = Repository::new(db.conn());
        repo.insert_deploy(&deploy_info("dota", TickMode::Fair)).unwrap();
        assert!(repo.insert_deploy(&deploy_info("dota", TickMode::Fair)).is_err());
    }

    #[test]
    fn test_balances_credit_debit() {
        let db = test_db();
        let repo = Repository::new(db.conn());
        repo.create_tables_for_new_tick("dota").unwrap();

        assert_eq!(repo.balance_of("dota", "alice").unwrap(), 0);
        repo.credit("dota", "alice", 100).unwrap();
        repo.credit("dota", "alice", 50).unwrap();
        assert_eq!(repo.balance_of("dota", "alice").unwrap(), 150);

        assert!(repo.debit("dota", "alice", 120).unwrap());
        assert_eq!(repo.balance_of("dota", "alice").unwrap(), 30);

        // Insufficient balance leaves state untouched.
        assert!(!repo.debit("dota", "alice", 31).unwrap());
        assert_eq!(repo.balance_of("dota", "alice").unwrap(), 30);
    }

    #[test]
    fn test_allowances() {
        let db = test_db();
        let repo = Repository::new(db.conn());
        repo.create_tables_for_new_tick("dota").unwrap();

        assert_eq!(repo.allowance_of("dota", "alice", "bob").unwrap(), 0);
        repo.set_allowance("dota", "alice", "bob", 100).unwrap();
        repo.set_allowance("dota", "alice", "bob", 80).unwrap();
        assert_eq!(repo.allowance_of("dota", "alice", "bob").unwrap(), 80);

        assert!(repo.spend_allowance("dota", "alice", "bob", 30).unwrap());
        assert_eq!(repo.allowance_of("dota", "alice", "bob").unwrap(), 50);
        assert!(!repo.spend_allowance("dota", "alice", "bob", 51).unwrap());
    }

    #[test]
    fn test_history_append_and_read() {
        let db = test_db();
        let repo = Repository::new(db.conn());
        repo.create_tables_for_new_tick("dota").unwrap();

        let row = HistoryRow {
            block_num: 10,
            extrinsic_index: 1,
            batchall_index: 0,
            op: "transfer".to_string(),
            origin: "alice".to_string(),
            counterparty: Some("bob".to_string()),
            amount: Some(25),
            memo_remark: Some("hello".to_string()),
        };
        repo.insert_history("dota", &row).unwrap();

        let rows = repo.history("dota").unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn test_tick_table_guard() {
        let db = test_db();
        let repo = Repository::new(db.conn());
        assert!(repo.create_tables_for_new_tick("DOTA").is_err());
        assert!(repo.create_tables_for_new_tick("do ta").is_err());
        assert!(repo.create_tables_for_new_tick("dota; DROP TABLE deploys").is_err());
        assert!(repo.create_tables_for_new_tick("").is_err());
    }

    #[test]
    fn test_repository_inside_transaction() {
        let mut db = test_db();
        {
            let tx = db.transaction().unwrap();
            let repo = Repository::new(&tx);
            repo.create_tables_for_new_tick("dota").unwrap();
            repo.credit("dota", "alice", 10).unwrap();
            // Dropped without commit: everything rolls back.
        }
        let repo = Repository::new(db.conn());
        assert!(repo.balance_of("dota", "alice").is_err());
    }
}
