//! Engine trait and sqlite-backed implementation

use crate::{Error, Result};
use dot20_core::{
    canonicalize_address, ApprovePayload, DeployPayload, MintPayload, Payload, Remark, TickMode,
    TransferFromPayload, TransferPayload,
};
use dot20_storage_sqlite::models::{DeployInfo, HistoryRow};
use dot20_storage_sqlite::Repository;
use rusqlite::Connection;

/// The dot-20 execution engine consumed by the indexer pipeline.
///
/// State-mutating methods take a bare [`Connection`]; pass an outer
/// transaction or a savepoint to scope the mutation (both deref to
/// `Connection`).
pub trait Dot20Engine {
    /// Structurally validate a remark's payload for its op.
    fn validate_payload(&self, remark: &Remark) -> Result<Payload>;

    /// Authoritative deploy record for a tick, if deployed.
    fn deploy_info(&self, conn: &Connection, tick: &str) -> Result<Option<DeployInfo>>;

    /// Register a new tick. Returns the tick name; the caller materializes
    /// the tick's tables afterwards.
    fn deploy(&self, conn: &Connection, remark: &Remark) -> Result<String>;

    /// Credit the signer with a mint.
    fn mint(&self, conn: &Connection, remark: &Remark) -> Result<()>;

    /// Move balance from the signer to a recipient.
    fn transfer(&self, conn: &Connection, remark: &Remark) -> Result<()>;

    /// Grant (overwrite) an allowance from the signer to a spender.
    fn approve(&self, conn: &Connection, remark: &Remark) -> Result<()>;

    /// Spend a granted allowance: the signer moves balance out of `from`.
    fn transfer_from(&self, conn: &Connection, remark: &Remark) -> Result<()>;
}

/// Engine over the sqlite store.
pub struct SqliteDot20Engine {
    ss58_prefix: u16,
}

impl SqliteDot20Engine {
    /// Create an engine canonicalizing addresses under the given SS58 prefix.
    pub fn new(ss58_prefix: u16) -> Self {
        Self { ss58_prefix }
    }

    fn canonical(&self, address: &str) -> Result<String> {
        Ok(canonicalize_address(address, self.ss58_prefix)?)
    }

    fn expect_deploy(payload: Payload) -> Result<DeployPayload> {
        match payload {
            Payload::Deploy(p) => Ok(p),
            other => Err(Error::UnexpectedOp(other.op().to_string())),
        }
    }

    fn expect_mint(payload: Payload) -> Result<MintPayload> {
        match payload {
            Payload::Mint(p) => Ok(p),
            other => Err(Error::UnexpectedOp(other.op().to_string())),
        }
    }

    fn expect_transfer(payload: Payload) -> Result<TransferPayload> {
        match payload {
            Payload::Transfer(p) => Ok(p),
            other => Err(Error::UnexpectedOp(other.op().to_string())),
        }
    }

    fn expect_approve(payload: Payload) -> Result<ApprovePayload> {
        match payload {
            Payload::Approve(p) => Ok(p),
            other => Err(Error::UnexpectedOp(other.op().to_string())),
        }
    }

    fn expect_transfer_from(payload: Payload) -> Result<TransferFromPayload> {
        match payload {
            Payload::TransferFrom(p) => Ok(p),
            other => Err(Error::UnexpectedOp(other.op().to_string())),
        }
    }

    fn history_row(remark: &Remark, op: &str, counterparty: Option<String>, amount: u64) -> HistoryRow {
        HistoryRow {
            block_num: remark.block_num,
            extrinsic_index: remark.extrinsic_index,
            batchall_index: remark.batchall_index,
            op: op.to_string(),
            origin: remark.origin.clone(),
            counterparty,
            amount: Some(amount),
            memo_remark: remark.memo_remark.clone(),
        }
    }
}

impl Dot20Engine for SqliteDot20Engine {
    fn validate_payload(&self, remark: &Remark) -> Result<Payload> {
        let payload = Payload::parse(&remark.memo)?;

        // Address fields must decode as SS58 for the op to be applicable.
        match &payload {
            Payload::Transfer(p) => {
                self.canonical(&p.to)?;
            }
            Payload::Approve(p) => {
                self.canonical(&p.to)?;
            }
            Payload::TransferFrom(p) => {
                self.canonical(&p.from)?;
                self.canonical(&p.to)?;
            }
            _ => {}
        }

        Ok(payload)
    }

    fn deploy_info(&self, conn: &Connection, tick: &str) -> Result<Option<DeployInfo>> {
        Ok(Repository::new(conn).get_deploy_info(tick)?)
    }

    fn deploy(&self, conn: &Connection, remark: &Remark) -> Result<String> {
        let payload = Self::expect_deploy(self.validate_payload(remark)?)?;
        let repo = Repository::new(conn);

        if repo.get_deploy_info(&payload.tick)?.is_some() {
            return Err(Error::AlreadyDeployed(payload.tick));
        }

        let info = DeployInfo {
            tick: payload.tick.clone(),
            mode: payload.mode,
            deployer: remark.origin.clone(),
            max_supply: payload.total,
            mint_limit: payload.lim,
            block_issuance: payload.amt,
            minted: 0,
            deploy_block: remark.block_num,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        repo.insert_deploy(&info)?;

        tracing::debug!(tick = %payload.tick, mode = %payload.mode, "tick deployed");
        Ok(payload.tick)
    }

    fn mint(&self, conn: &Connection, remark: &Remark) -> Result<()> {
        let payload = Self::expect_mint(self.validate_payload(remark)?)?;
        let repo = Repository::new(conn);

        let info = repo
            .get_deploy_info(&payload.tick)?
            .ok_or_else(|| Error::NotDeployed(payload.tick.clone()))?;

        let amount = payload.lim;
        match info.mode {
            TickMode::Owner => {
                if remark.origin != info.deployer {
                    return Err(Error::NotOwner(remark.origin.clone()));
                }
            }
            TickMode::Normal => {
                if amount > info.mint_limit.unwrap_or(0) {
                    return Err(Error::MintLimitExceeded(format!(
                        "{} > {:?}",
                        amount, info.mint_limit
                    )));
                }
            }
            // Fair-mode amounts are assigned by the indexer's block split.
            TickMode::Fair => {}
        }

        match info.minted.checked_add(amount) {
            Some(total) if total <= info.max_supply => {}
            _ => {
                return Err(Error::SupplyExceeded(format!(
                    "{}: minted {} + {} > {}",
                    payload.tick, info.minted, amount, info.max_supply
                )))
            }
        }

        repo.credit(&payload.tick, &remark.origin, amount)?;
        repo.add_minted(&payload.tick, amount)?;
        repo.insert_history(&payload.tick, &Self::history_row(remark, "mint", None, amount))?;
        Ok(())
    }

    fn transfer(&self, conn: &Connection, remark: &Remark) -> Result<()> {
        let payload = Self::expect_transfer(self.validate_payload(remark)?)?;
        let repo = Repository::new(conn);

        if repo.get_deploy_info(&payload.tick)?.is_none() {
            return Err(Error::NotDeployed(payload.tick));
        }

        let to = self.canonical(&payload.to)?;
        if !repo.debit(&payload.tick, &remark.origin, payload.amt)? {
            return Err(Error::InsufficientBalance(format!(
                "{} has less than {} {}",
                remark.origin, payload.amt, payload.tick
            )));
        }
        repo.credit(&payload.tick, &to, payload.amt)?;
        repo.insert_history(
            &payload.tick,
            &Self::history_row(remark, "transfer", Some(to), payload.amt),
        )?;
        Ok(())
    }

    fn approve(&self, conn: &Connection, remark: &Remark) -> Result<()> {
        let payload = Self::expect_approve(self.validate_payload(remark)?)?;
        let repo = Repository::new(conn);

        if repo.get_deploy_info(&payload.tick)?.is_none() {
            return Err(Error::NotDeployed(payload.tick));
        }

        let spender = self.canonical(&payload.to)?;
        repo.set_allowance(&payload.tick, &remark.origin, &spender, payload.amt)?;
        repo.insert_history(
            &payload.tick,
            &Self::history_row(remark, "approve", Some(spender), payload.amt),
        )?;
        Ok(())
    }

    fn transfer_from(&self, conn: &Connection, remark: &Remark) -> Result<()> {
        let payload = Self::expect_transfer_from(self.validate_payload(remark)?)?;
        let repo = Repository::new(conn);

        if repo.get_deploy_info(&payload.tick)?.is_none() {
            return Err(Error::NotDeployed(payload.tick));
        }

        let from = self.canonical(&payload.from)?;
        let to = self.canonical(&payload.to)?;

        // Partial mutations on the domain-error paths below are fine: the
        // caller wraps each op in a savepoint and rolls it back wholesale.
        if !repo.spend_allowance(&payload.tick, &from, &remark.origin, payload.amt)? {
            return Err(Error::InsufficientAllowance(format!(
                "{} -> {} below {}",
                from, remark.origin, payload.amt
            )));
        }
        if !repo.debit(&payload.tick, &from, payload.amt)? {
            return Err(Error::InsufficientBalance(format!(
                "{} has less than {} {}",
                from, payload.amt, payload.tick
            )));
        }
        repo.credit(&payload.tick, &to, payload.amt)?;
        repo.insert_history(
            &payload.tick,
            &Self::history_row(remark, "transferFrom", Some(from), payload.amt),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot20_core::encode_ss58;
    use dot20_storage_sqlite::Database;
    use serde_json::{json, Value};

    const PREFIX: u16 = 42;

    fn addr(seed: u8) -> String {
        encode_ss58(PREFIX, &[seed; 32])
    }

    fn remark(origin: &str, memo: Value) -> Remark {
        Remark {
            block_num: 100,
            extrinsic_index: 0,
            batchall_index: 0,
            origin: origin.to_string(),
            memo,
            text: String::new(),
            memo_remark: None,
        }
    }

    fn engine() -> SqliteDot20Engine {
        SqliteDot20Engine::new(PREFIX)
    }

    fn deploy_tick(db: &Database, engine: &SqliteDot20Engine, memo: Value, deployer: &str) {
        let tick = engine.deploy(db.conn(), &remark(deployer, memo)).unwrap();
        Repository::new(db.conn())
            .create_tables_for_new_tick(&tick)
            .unwrap();
    }

    fn fair_deploy(total: u64, amt: u64) -> Value {
        json!({"p": "dot-20", "op": "deploy", "tick": "dota",
               "mode": "fair", "total": total, "amt": amt})
    }

    #[test]
    fn test_deploy_and_redeploy() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);

        deploy_tick(&db, &e, fair_deploy(1000, 100), &alice);
        let info = e.deploy_info(db.conn(), "dota").unwrap().unwrap();
        assert_eq!(info.mode, TickMode::Fair);
        assert_eq!(info.deployer, alice);
        assert_eq!(info.block_issuance, Some(100));

        let again = e.deploy(db.conn(), &remark(&alice, fair_deploy(1000, 100)));
        assert!(matches!(again, Err(Error::AlreadyDeployed(_))));
    }

    #[test]
    fn test_mint_supply_cap() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        deploy_tick(&db, &e, fair_deploy(250, 100), &alice);

        let mint = |lim: u64| remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": lim}));
        e.mint(db.conn(), &mint(100)).unwrap();
        e.mint(db.conn(), &mint(100)).unwrap();
        assert!(matches!(
            e.mint(db.conn(), &mint(100)),
            Err(Error::SupplyExceeded(_))
        ));

        let repo = Repository::new(db.conn());
        assert_eq!(repo.balance_of("dota", &alice).unwrap(), 200);
        assert_eq!(repo.get_deploy_info("dota").unwrap().unwrap().minted, 200);
    }

    #[test]
    fn test_normal_mode_mint_limit() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        deploy_tick(
            &db,
            &e,
            json!({"p": "dot-20", "op": "deploy", "tick": "dota",
                   "mode": "normal", "total": 1000, "lim": 10}),
            &alice,
        );

        let bob = addr(2);
        let over = remark(&bob, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 11}));
        assert!(matches!(
            e.mint(db.conn(), &over),
            Err(Error::MintLimitExceeded(_))
        ));

        let ok = remark(&bob, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 10}));
        e.mint(db.conn(), &ok).unwrap();
        assert_eq!(Repository::new(db.conn()).balance_of("dota", &bob).unwrap(), 10);
    }

    #[test]
    fn test_owner_mode_restricts_minter() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        let bob = addr(2);
        deploy_tick(
            &db,
            &e,
            json!({"p": "dot-20", "op": "deploy", "tick": "dota",
                   "mode": "owner", "total": 1000}),
            &alice,
        );

        let from_bob = remark(&bob, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 5}));
        assert!(matches!(e.mint(db.conn(), &from_bob), Err(Error::NotOwner(_))));

        let from_alice = remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 5}));
        e.mint(db.conn(), &from_alice).unwrap();
    }

    #[test]
    fn test_transfer_and_insufficient_balance() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        let bob = addr(2);
        deploy_tick(&db, &e, fair_deploy(1000, 100), &alice);
        e.mint(
            db.conn(),
            &remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 100})),
        )
        .unwrap();

        let transfer = remark(
            &alice,
            json!({"p": "dot-20", "op": "transfer", "tick": "dota", "to": bob, "amt": 60}),
        );
        e.transfer(db.conn(), &transfer).unwrap();

        let repo = Repository::new(db.conn());
        assert_eq!(repo.balance_of("dota", &alice).unwrap(), 40);
        assert_eq!(repo.balance_of("dota", &bob).unwrap(), 60);

        let too_much = remark(
            &alice,
            json!({"p": "dot-20", "op": "transfer", "tick": "dota", "to": bob, "amt": 41}),
        );
        assert!(matches!(
            e.transfer(db.conn(), &too_much),
            Err(Error::InsufficientBalance(_))
        ));
    }

    #[test]
    fn test_approve_then_transfer_from() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        let bob = addr(2);
        let carol = addr(3);
        deploy_tick(&db, &e, fair_deploy(1000, 100), &alice);
        e.mint(
            db.conn(),
            &remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 100})),
        )
        .unwrap();

        e.approve(
            db.conn(),
            &remark(&alice, json!({"p": "dot-20", "op": "approve", "tick": "dota", "to": bob, "amt": 50})),
        )
        .unwrap();

        // Bob spends 30 of Alice's balance toward Carol.
        e.transfer_from(
            db.conn(),
            &remark(&bob, json!({"p": "dot-20", "op": "transferFrom", "tick": "dota",
                                 "from": alice, "to": carol, "amt": 30})),
        )
        .unwrap();

        let repo = Repository::new(db.conn());
        assert_eq!(repo.balance_of("dota", &alice).unwrap(), 70);
        assert_eq!(repo.balance_of("dota", &carol).unwrap(), 30);
        assert_eq!(repo.allowance_of("dota", &alice, &bob).unwrap(), 20);

        // Remaining allowance is too small now.
        let res = e.transfer_from(
            db.conn(),
            &remark(&bob, json!({"p": "dot-20", "op": "transferFrom", "tick": "dota",
                                 "from": alice, "to": carol, "amt": 21})),
        );
        assert!(matches!(res, Err(Error::InsufficientAllowance(_))));
    }

    #[test]
    fn test_undeployed_tick_is_domain_error() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);

        let mint = remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 5}));
        let err = e.mint(db.conn(), &mint).unwrap_err();
        assert!(matches!(err, Error::NotDeployed(_)));
        assert!(!err.is_storage());
    }

    #[test]
    fn test_wrong_op_routing() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);

        let mint = remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 5}));
        assert!(matches!(
            e.transfer(db.conn(), &mint),
            Err(Error::UnexpectedOp(_))
        ));
    }

    #[test]
    fn test_memo_remark_lands_in_history() {
        let db = Database::open_in_memory().unwrap();
        let e = engine();
        let alice = addr(1);
        deploy_tick(&db, &e, fair_deploy(1000, 100), &alice);

        let mut mint = remark(&alice, json!({"p": "dot-20", "op": "mint", "tick": "dota", "lim": 10}));
        mint.memo_remark = Some("gm".to_string());
        e.mint(db.conn(), &mint).unwrap();

        let history = Repository::new(db.conn()).history("dota").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].memo_remark.as_deref(), Some("gm"));
    }
}
