//! Persistence tests across database reopen

use dot20_core::TickMode;
use dot20_storage_sqlite::models::DeployInfo;
use dot20_storage_sqlite::{Database, IndexerStatusStore, Repository};
use tempfile::NamedTempFile;

fn deploy_info(tick: &str) -> DeployInfo {
    DeployInfo {
        tick: tick.to_string(),
        mode: TickMode::Normal,
        deployer: "alice".to_string(),
        max_supply: 21_000_000,
        mint_limit: Some(1_000),
        block_issuance: None,
        minted: 0,
        deploy_block: 12,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[test]
fn state_survives_reopen() {
    let file = NamedTempFile::new().unwrap();

    {
        let db = Database::open(file.path()).unwrap();
        let repo = Repository::new(db.conn());
        repo.insert_deploy(&deploy_info("dota")).unwrap();
        repo.create_tables_for_new_tick("dota").unwrap();
        repo.credit("dota", "alice", 500).unwrap();
        IndexerStatusStore::new(db.conn())
            .upsert("dot-20", 12, 12)
            .unwrap();
    }

    let db = Database::open(file.path()).unwrap();
    let repo = Repository::new(db.conn());

    let info = repo.get_deploy_info("dota").unwrap().unwrap();
    assert_eq!(info.mode, TickMode::Normal);
    assert_eq!(info.mint_limit, Some(1_000));

    assert_eq!(repo.balance_of("dota", "alice").unwrap(), 500);
    assert_eq!(repo.balances("dota").unwrap(), vec![("alice".to_string(), 500)]);

    let status = IndexerStatusStore::new(db.conn())
        .get("dot-20")
        .unwrap()
        .unwrap();
    assert_eq!(status.indexer_height, 12);
}

#[test]
fn outer_rollback_discards_savepoint_commits() {
    let file = NamedTempFile::new().unwrap();
    let mut db = Database::open(file.path()).unwrap();
    {
        let repo = Repository::new(db.conn());
        repo.create_tables_for_new_tick("dota").unwrap();
    }

    {
        let mut tx = db.transaction().unwrap();
        {
            let sp = tx.savepoint().unwrap();
            Repository::new(&sp).credit("dota", "alice", 100).unwrap();
            sp.commit().unwrap();
        }
        // Outer transaction dropped without commit.
    }

    let repo = Repository::new(db.conn());
    assert_eq!(repo.balance_of("dota", "alice").unwrap(), 0);
}
