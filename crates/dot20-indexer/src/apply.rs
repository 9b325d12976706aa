//! Block application
//!
//! Third pipeline stage. Deploys run first, each in its own outer
//! transaction, because they materialize the per-tick tables everything
//! else addresses. Mints and other ops then commit together with the
//! cursor advance in a single outer transaction; inside it, each mint and
//! each batchall runs in a nested savepoint so a domain failure costs only
//! its own unit while a storage failure aborts the whole block.

use crate::classify::ClassifiedBlock;
use crate::error::fatal_engine_error;
use crate::filter::group_consecutive;
use crate::{Error, Result};
use dot20_core::{Remark, TickMode, PROTOCOL};
use dot20_engine::{Dot20Engine, Error as EngineError};
use dot20_storage_sqlite::models::HistoryRow;
use dot20_storage_sqlite::status::upsert_status_tx;
use dot20_storage_sqlite::{Database, Repository};
use rusqlite::{Connection, Transaction};
use serde_json::{json, Value};

/// Applies one classified block to storage.
pub struct Applier<'a, E> {
    db: &'a mut Database,
    engine: &'a E,
}

impl<'a, E: Dot20Engine> Applier<'a, E> {
    /// Create an applier over the store and engine.
    pub fn new(db: &'a mut Database, engine: &'a E) -> Self {
        Self { db, engine }
    }

    /// Apply one block: deploys, then mints + others + cursor, atomically.
    pub fn apply_block(&mut self, block_num: u64, block: ClassifiedBlock) -> Result<()> {
        for deploy in &block.deploys {
            self.apply_deploy(deploy)?;
        }

        let engine = self.engine;
        let mut tx = self.db.transaction()?;
        Self::apply_mints(&mut tx, engine, block.mints)?;
        Self::apply_others(&mut tx, engine, block.others)?;
        upsert_status_tx(&tx, PROTOCOL, block_num, block_num)?;
        tx.commit()?;

        tracing::debug!(block = block_num, "block committed");
        Ok(())
    }

    /// One deploy in its own outer transaction: engine registration, then
    /// per-tick table materialization, then the history record.
    fn apply_deploy(&mut self, remark: &Remark) -> Result<()> {
        let engine = self.engine;
        let tx = self.db.transaction()?;

        match engine.deploy(&tx, remark) {
            Ok(tick) => {
                let repo = Repository::new(&tx);
                repo.create_tables_for_new_tick(&tick)?;
                repo.insert_history(
                    &tick,
                    &HistoryRow {
                        block_num: remark.block_num,
                        extrinsic_index: remark.extrinsic_index,
                        batchall_index: remark.batchall_index,
                        op: "deploy".to_string(),
                        origin: remark.origin.clone(),
                        counterparty: None,
                        amount: remark.memo.get("total").and_then(Value::as_u64),
                        memo_remark: remark.memo_remark.clone(),
                    },
                )?;
                tx.commit()?;
                tracing::debug!(tick = %tick, "deploy committed");
                Ok(())
            }
            Err(e) if e.is_storage() => Err(Error::Storage(e.to_string())),
            Err(e) => {
                // Dropped transaction rolls back the failed deploy.
                tracing::warn!("deploy failed: {}", e);
                Ok(())
            }
        }
    }

    /// Ordinary mints, one savepoint each. Fair-mode amounts are the equal
    /// split of the tick's per-block issuance over this block's minters.
    fn apply_mints(
        tx: &mut Transaction<'_>,
        engine: &E,
        mints: std::collections::BTreeMap<String, Vec<Remark>>,
    ) -> Result<()> {
        for (tick, mut remarks) in mints {
            let info = engine
                .deploy_info(&*tx, &tick)
                .map_err(fatal_engine_error)?
                .ok_or_else(|| Error::Invariant(format!("{} not deployed at mint time", tick)))?;

            if info.mode == TickMode::Fair {
                let issuance = info.block_issuance.unwrap_or(0);
                let per_mint = issuance / remarks.len() as u64;
                for remark in &mut remarks {
                    remark.memo["lim"] = json!(per_mint);
                }
            }

            for remark in remarks {
                let sp = tx.savepoint()?;
                match engine.mint(&sp, &remark) {
                    Ok(()) => {
                        sp.commit()?;
                        tracing::debug!(tick = %tick, origin = %remark.origin, "mint applied");
                    }
                    Err(e) if e.is_storage() => return Err(Error::Storage(e.to_string())),
                    Err(e) => {
                        // Savepoint drop rolls the mint back.
                        tracing::warn!(tick = %tick, origin = %remark.origin, "mint failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Other ops, one savepoint per batchall, executed in order.
    fn apply_others(tx: &mut Transaction<'_>, engine: &E, others: Vec<Remark>) -> Result<()> {
        for extrinsic in group_consecutive(others, |r| r.extrinsic_index) {
            for batch in group_consecutive(extrinsic, |r| r.batchall_index) {
                let sp = tx.savepoint()?;
                match Self::apply_batchall(&sp, engine, &batch) {
                    Ok(()) => {
                        sp.commit()?;
                        tracing::debug!(
                            extrinsic = batch[0].extrinsic_index,
                            batchall = batch[0].batchall_index,
                            "batchall applied"
                        );
                    }
                    Err(e) if e.is_storage() => return Err(Error::Storage(e.to_string())),
                    Err(e) => {
                        // The batchall is lost as a unit; later ones continue.
                        tracing::warn!("batchall failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_batchall(
        conn: &Connection,
        engine: &E,
        batch: &[Remark],
    ) -> std::result::Result<(), EngineError> {
        for remark in batch {
            match remark.op() {
                // Deploys never reach this phase; treat one as fatal to the
                // batchall rather than silently applying it out of order.
                Some("deploy") => {
                    return Err(EngineError::UnexpectedOp(
                        "deploy in batchall phase".to_string(),
                    ))
                }
                Some("mint") => {
                    let tick = remark.tick().unwrap_or_default();
                    let info = engine
                        .deploy_info(conn, tick)?
                        .ok_or_else(|| EngineError::NotDeployed(tick.to_string()))?;
                    if info.mode != TickMode::Owner {
                        return Err(EngineError::UnexpectedOp(
                            "ordinary mint in batchall phase".to_string(),
                        ));
                    }
                    engine.mint(conn, remark)?;
                }
                Some("transfer") => engine.transfer(conn, remark)?,
                Some("approve") => engine.approve(conn, remark)?,
                Some("transferFrom") => engine.transfer_from(conn, remark)?,
                other => {
                    return Err(EngineError::UnexpectedOp(format!(
                        "{}",
                        other.unwrap_or("<missing>")
                    )))
                }
            }
        }
        Ok(())
    }
}
