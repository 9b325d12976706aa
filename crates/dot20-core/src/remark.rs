//! Remark records extracted from chain blocks

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One dot-20 operation candidate inside one batch of one extrinsic.
///
/// Remarks arrive sorted by `(extrinsic_index, batchall_index, position)`
/// and the pipeline preserves that order end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remark {
    /// Block the remark was included in.
    pub block_num: u64,
    /// Index of the containing extrinsic within the block.
    pub extrinsic_index: u32,
    /// Index of the containing batched call within the extrinsic.
    pub batchall_index: u32,
    /// Signer of the extrinsic, canonicalized to the chain's SS58 format.
    pub origin: String,
    /// Parsed remark payload object.
    pub memo: Value,
    /// Free text for `memo` ops, the raw remark string otherwise.
    pub text: String,
    /// Trailing-memo text folded in by the filter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo_remark: Option<String>,
}

impl Remark {
    /// The payload's `op` field, if present and a string.
    pub fn op(&self) -> Option<&str> {
        self.memo.get("op").and_then(Value::as_str)
    }

    /// The payload's `tick` field, if present and a string.
    pub fn tick(&self) -> Option<&str> {
        self.memo.get("tick").and_then(Value::as_str)
    }
}
