//! Row models

use dot20_core::TickMode;

/// Deploy registry row for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployInfo {
    /// Tick name (lowercase ASCII).
    pub tick: String,
    /// Issuance mode, fixed at deploy.
    pub mode: TickMode,
    /// Deploying account (canonical SS58).
    pub deployer: String,
    /// Maximum supply.
    pub max_supply: u64,
    /// Per-mint cap (`normal` mode).
    pub mint_limit: Option<u64>,
    /// Per-block issuance (`fair` mode).
    pub block_issuance: Option<u64>,
    /// Supply minted so far.
    pub minted: u64,
    /// Block the deploy landed in.
    pub deploy_block: u64,
    /// Insertion timestamp (ISO 8601).
    pub created_at: String,
}

/// Indexer cursor row, one per protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerStatusRow {
    /// Protocol identifier (`dot-20`).
    pub protocol: String,
    /// Highest block whose state changes are committed.
    pub indexer_height: u64,
    /// Highest block fetched from the chain.
    pub crawler_height: u64,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// One applied operation in a tick's history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    /// Block the operation landed in.
    pub block_num: u64,
    /// Extrinsic index within the block.
    pub extrinsic_index: u32,
    /// Batch index within the extrinsic.
    pub batchall_index: u32,
    /// Operation name.
    pub op: String,
    /// Signer of the operation.
    pub origin: String,
    /// Counterparty, where the op has one (`to`, or `from` for spends).
    pub counterparty: Option<String>,
    /// Amount moved or granted.
    pub amount: Option<u64>,
    /// Folded trailing-memo text, if any.
    pub memo_remark: Option<String>,
}
