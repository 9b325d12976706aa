//! Typed dot-20 operation payloads
//!
//! Remark memos are semi-structured JSON. Each op maps to a payload record
//! with `deny_unknown_fields`, so anything outside the known shape fails
//! validation closed.

use crate::tick::TickMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol tag expected in every payload's `p` field.
pub const PROTOCOL: &str = "dot-20";

/// The supported operation taxonomy.
pub const SUPPORTED_OPS: &[&str] = &[
    "deploy",
    "mint",
    "transfer",
    "transferFrom",
    "approve",
    "memo",
];

/// Check an op string against the taxonomy.
pub fn is_supported_op(op: &str) -> bool {
    SUPPORTED_OPS.contains(&op)
}

/// `deploy` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployPayload {
    /// Protocol tag, always `dot-20`.
    pub p: String,
    /// Operation name, always `deploy`.
    pub op: String,
    /// Tick being deployed.
    pub tick: String,
    /// Issuance mode, fixed for the tick's lifetime.
    pub mode: TickMode,
    /// Maximum supply.
    pub total: u64,
    /// Per-mint cap; required for `normal` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lim: Option<u64>,
    /// Per-block issuance; required for `fair` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amt: Option<u64>,
}

/// `mint` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MintPayload {
    /// Protocol tag.
    pub p: String,
    /// Operation name.
    pub op: String,
    /// Target tick.
    pub tick: String,
    /// Requested amount; overwritten by the indexer for `fair` ticks.
    pub lim: u64,
}

/// `transfer` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferPayload {
    /// Protocol tag.
    pub p: String,
    /// Operation name.
    pub op: String,
    /// Target tick.
    pub tick: String,
    /// Recipient address.
    pub to: String,
    /// Amount to move.
    pub amt: u64,
}

/// `approve` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovePayload {
    /// Protocol tag.
    pub p: String,
    /// Operation name.
    pub op: String,
    /// Target tick.
    pub tick: String,
    /// Spender being granted the allowance.
    pub to: String,
    /// Allowance amount (overwrites any previous grant).
    pub amt: u64,
}

/// `transferFrom` payload; the signer spends a granted allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferFromPayload {
    /// Protocol tag.
    pub p: String,
    /// Operation name.
    pub op: String,
    /// Target tick.
    pub tick: String,
    /// Account whose balance is debited.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Amount to move.
    pub amt: u64,
}

/// `memo` payload. Never a standalone state change; folded into the
/// preceding operation of its batch by the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoPayload {
    /// Protocol tag.
    pub p: String,
    /// Operation name.
    pub op: String,
    /// Tick the memo annotates.
    pub tick: String,
    /// Free text; may also ride in the remark's raw text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A validated dot-20 payload, tagged by op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Deploy a new tick.
    Deploy(DeployPayload),
    /// Mint into the signer's balance.
    Mint(MintPayload),
    /// Move balance from the signer.
    Transfer(TransferPayload),
    /// Move balance out of a granted allowance.
    TransferFrom(TransferFromPayload),
    /// Grant an allowance.
    Approve(ApprovePayload),
    /// Annotate the preceding operation.
    Memo(MemoPayload),
}

impl Payload {
    /// Parse and validate a memo object into its typed payload.
    pub fn parse(memo: &Value) -> Result<Self> {
        let op = memo
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidPayload("missing op field".to_string()))?;

        let payload = match op {
            "deploy" => Payload::Deploy(serde_json::from_value(memo.clone())?),
            "mint" => Payload::Mint(serde_json::from_value(memo.clone())?),
            "transfer" => Payload::Transfer(serde_json::from_value(memo.clone())?),
            "transferFrom" => Payload::TransferFrom(serde_json::from_value(memo.clone())?),
            "approve" => Payload::Approve(serde_json::from_value(memo.clone())?),
            "memo" => Payload::Memo(serde_json::from_value(memo.clone())?),
            other => return Err(Error::UnsupportedOp(other.to_string())),
        };

        payload.check()?;
        Ok(payload)
    }

    /// The payload's op name.
    pub fn op(&self) -> &'static str {
        match self {
            Payload::Deploy(_) => "deploy",
            Payload::Mint(_) => "mint",
            Payload::Transfer(_) => "transfer",
            Payload::TransferFrom(_) => "transferFrom",
            Payload::Approve(_) => "approve",
            Payload::Memo(_) => "memo",
        }
    }

    /// The payload's tick.
    pub fn tick(&self) -> &str {
        match self {
            Payload::Deploy(p) => &p.tick,
            Payload::Mint(p) => &p.tick,
            Payload::Transfer(p) => &p.tick,
            Payload::TransferFrom(p) => &p.tick,
            Payload::Approve(p) => &p.tick,
            Payload::Memo(p) => &p.tick,
        }
    }

    fn protocol(&self) -> &str {
        match self {
            Payload::Deploy(p) => &p.p,
            Payload::Mint(p) => &p.p,
            Payload::Transfer(p) => &p.p,
            Payload::TransferFrom(p) => &p.p,
            Payload::Approve(p) => &p.p,
            Payload::Memo(p) => &p.p,
        }
    }

    fn check(&self) -> Result<()> {
        if self.protocol() != PROTOCOL {
            return Err(Error::InvalidPayload(format!(
                "wrong protocol tag: {}",
                self.protocol()
            )));
        }

        match self {
            Payload::Deploy(p) => {
                if p.op != "deploy" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                if p.total == 0 {
                    return Err(Error::InvalidPayload("zero max supply".to_string()));
                }
                match p.mode {
                    TickMode::Normal if p.lim.unwrap_or(0) == 0 => Err(Error::InvalidPayload(
                        "normal mode requires a nonzero lim".to_string(),
                    )),
                    TickMode::Fair if p.amt.unwrap_or(0) == 0 => Err(Error::InvalidPayload(
                        "fair mode requires a nonzero amt".to_string(),
                    )),
                    _ => Ok(()),
                }
            }
            Payload::Mint(p) => {
                if p.op != "mint" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                if p.lim == 0 {
                    return Err(Error::InvalidPayload("zero mint amount".to_string()));
                }
                Ok(())
            }
            Payload::Transfer(p) => {
                if p.op != "transfer" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                check_amount_and_parties(p.amt, &[p.to.as_str()])
            }
            Payload::TransferFrom(p) => {
                if p.op != "transferFrom" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                check_amount_and_parties(p.amt, &[p.from.as_str(), p.to.as_str()])
            }
            Payload::Approve(p) => {
                if p.op != "approve" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                check_amount_and_parties(p.amt, &[p.to.as_str()])
            }
            Payload::Memo(p) => {
                if p.op != "memo" {
                    return Err(Error::InvalidPayload(format!("op mismatch: {}", p.op)));
                }
                Ok(())
            }
        }
    }
}

fn check_amount_and_parties(amt: u64, parties: &[&str]) -> Result<()> {
    if amt == 0 {
        return Err(Error::InvalidPayload("zero amount".to_string()));
    }
    for party in parties {
        if party.is_empty() {
            return Err(Error::InvalidPayload("empty address field".to_string()));
        }
    }
    Ok(())
}
