//! Remark classification
//!
//! Second pipeline stage. Partitions the filter's output into ordinary
//! mints (grouped by tick, one per origin per block), deploys, and
//! everything else, preserving extrinsic and batch order within each
//! category.

use crate::filter::group_consecutive;
use crate::tick_cache::TickModeCache;
use dot20_core::{Remark, TickMode};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One block's remarks, partitioned for application.
#[derive(Debug, Default)]
pub struct ClassifiedBlock {
    /// Ordinary (fair/normal) mints by tick, in arrival order.
    pub mints: BTreeMap<String, Vec<Remark>>,
    /// Deploys in arrival order.
    pub deploys: Vec<Remark>,
    /// Everything executed per batchall: transfers, approvals, allowance
    /// spends, owner-mode mints.
    pub others: Vec<Remark>,
}

/// Classify one block's filtered remarks.
pub fn classify_remarks(cache: &TickModeCache, remarks: Vec<Remark>) -> ClassifiedBlock {
    let mut block = ClassifiedBlock::default();
    // Per-block bookkeeping: each origin gets one ordinary mint per tick.
    let mut seen_by_tick: HashMap<String, HashSet<String>> = HashMap::new();

    for extrinsic in group_consecutive(remarks, |r| r.extrinsic_index) {
        if extrinsic.len() != 1 {
            block.others.extend(extrinsic);
            continue;
        }

        let remark = extrinsic.into_iter().next().expect("group is non-empty");
        let op = remark.op().unwrap_or_default().to_string();
        let tick = remark.tick().unwrap_or_default().to_string();

        match op.as_str() {
            "mint" if cache.mode_of(&tick) != Some(TickMode::Owner) => {
                let minters = seen_by_tick.entry(tick.clone()).or_default();
                if minters.insert(remark.origin.clone()) {
                    block.mints.entry(tick).or_default().push(remark);
                } else {
                    tracing::warn!(
                        tick = %tick,
                        origin = %remark.origin,
                        "mint already submitted in this block, dropping"
                    );
                }
            }
            "deploy" => block.deploys.push(remark),
            _ => block.others.push(remark),
        }
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn remark(extrinsic_index: u32, origin: &str, memo: Value) -> Remark {
        Remark {
            block_num: 50,
            extrinsic_index,
            batchall_index: 0,
            origin: origin.to_string(),
            memo,
            text: String::new(),
            memo_remark: None,
        }
    }

    fn mint(extrinsic_index: u32, origin: &str, tick: &str) -> Remark {
        remark(
            extrinsic_index,
            origin,
            json!({"p": "dot-20", "op": "mint", "tick": tick, "lim": 10}),
        )
    }

    fn cache_with(tick: &str, mode: TickMode) -> TickModeCache {
        let mut cache = TickModeCache::new();
        cache.record(tick, mode);
        cache
    }

    #[test]
    fn test_ordinary_mints_grouped_by_tick() {
        let cache = cache_with("dota", TickMode::Fair);
        let block = classify_remarks(
            &cache,
            vec![mint(0, "alice", "dota"), mint(1, "bob", "dota")],
        );

        assert_eq!(block.mints["dota"].len(), 2);
        assert!(block.deploys.is_empty());
        assert!(block.others.is_empty());
    }

    #[test]
    fn test_duplicate_minter_dropped_silently() {
        let cache = cache_with("dota", TickMode::Fair);
        let block = classify_remarks(
            &cache,
            vec![
                mint(0, "alice", "dota"),
                mint(1, "alice", "dota"),
                mint(2, "alice", "dota"),
                mint(3, "bob", "dota"),
            ],
        );

        let origins: Vec<&str> = block.mints["dota"].iter().map(|r| r.origin.as_str()).collect();
        assert_eq!(origins, vec!["alice", "bob"]);
        // Duplicates do not leak into the other-op list either.
        assert!(block.others.is_empty());
    }

    #[test]
    fn test_uniqueness_is_per_tick() {
        let mut cache = cache_with("dota", TickMode::Fair);
        cache.record("idot", TickMode::Normal);
        let block = classify_remarks(
            &cache,
            vec![mint(0, "alice", "dota"), mint(1, "alice", "idot")],
        );

        assert_eq!(block.mints["dota"].len(), 1);
        assert_eq!(block.mints["idot"].len(), 1);
    }

    #[test]
    fn test_deploys_routed_separately() {
        let cache = TickModeCache::new();
        let deploy = remark(
            0,
            "alice",
            json!({"p": "dot-20", "op": "deploy", "tick": "dota", "mode": "fair",
                   "total": 100, "amt": 10}),
        );
        let block = classify_remarks(&cache, vec![deploy]);
        assert_eq!(block.deploys.len(), 1);
        assert!(block.mints.is_empty());
        assert!(block.others.is_empty());
    }

    #[test]
    fn test_owner_mint_goes_to_others() {
        let cache = cache_with("dota", TickMode::Owner);
        let block = classify_remarks(&cache, vec![mint(0, "alice", "dota")]);
        assert!(block.mints.is_empty());
        assert_eq!(block.others.len(), 1);
    }

    #[test]
    fn test_multi_remark_extrinsics_stay_together_in_others() {
        let cache = cache_with("dota", TickMode::Fair);
        let transfer = |extrinsic: u32, origin: &str| {
            remark(
                extrinsic,
                origin,
                json!({"p": "dot-20", "op": "transfer", "tick": "dota", "to": "X", "amt": 1}),
            )
        };
        let block = classify_remarks(
            &cache,
            vec![transfer(0, "alice"), transfer(0, "alice"), transfer(1, "bob")],
        );

        assert_eq!(block.others.len(), 3);
        let extrinsics: Vec<u32> = block.others.iter().map(|r| r.extrinsic_index).collect();
        assert_eq!(extrinsics, vec![0, 0, 1]);
    }
}
