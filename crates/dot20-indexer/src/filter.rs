//! Batch-level remark filtering
//!
//! First pipeline stage. Works on two-level groups (extrinsic, then batch
//! within the extrinsic) and either keeps a batch whole (after folding a
//! trailing memo) or drops it whole. The check order per remark is fixed:
//! structural validation, deploy probe, allowlist, exclusivity, memo
//! position. Exclusivity violations cost the entire extrinsic.
//!
//! All rejections are data-level: they log at warn and drop the unit. The
//! only error this stage can return is a storage failure from the deploy
//! probe, which the runner treats like any other storage error.

use crate::tick_cache::TickModeCache;
use crate::{Error, Result};
use dot20_core::{is_supported_op, is_supported_tick, normalize_tick, Payload, Remark, TickMode};
use dot20_engine::Dot20Engine;
use rusqlite::Connection;
use serde_json::Value;
use std::collections::HashMap;

/// Split an ordered remark list into consecutive groups with equal keys.
pub(crate) fn group_consecutive<K, F>(remarks: Vec<Remark>, key: F) -> Vec<Vec<Remark>>
where
    K: PartialEq,
    F: Fn(&Remark) -> K,
{
    let mut groups: Vec<Vec<Remark>> = Vec::new();
    for remark in remarks {
        match groups.last_mut() {
            Some(group) if key(&group[0]) == key(&remark) => group.push(remark),
            _ => groups.push(vec![remark]),
        }
    }
    groups
}

/// Filter one block's ordered remark list down to the batches that survive
/// the base rules, preserving input order.
pub fn base_filter_remarks<E: Dot20Engine>(
    conn: &Connection,
    engine: &E,
    cache: &mut TickModeCache,
    remarks: Vec<Remark>,
) -> Result<Vec<Remark>> {
    let mut out = Vec::new();

    'extrinsics: for extrinsic in group_consecutive(remarks, |r| r.extrinsic_index) {
        let extrinsic_len = extrinsic.len();
        let second_op = extrinsic.get(1).and_then(|r| r.op()).map(str::to_string);

        'batches: for mut batch in group_consecutive(extrinsic, |r| r.batchall_index) {
            for remark in &mut batch {
                normalize_memo_tick(remark);
            }

            // Modes declared by deploys earlier in this batch. Promoted into
            // the process cache only if the whole batch survives, so a
            // rejected deploy never poisons later blocks' validation.
            let mut pending_deploys: HashMap<String, TickMode> = HashMap::new();

            let mut i = 0;
            while i < batch.len() {
                // Structural validation for the remark's op.
                let payload = match engine.validate_payload(&batch[i]) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(
                            block = batch[i].block_num,
                            "illegal payload, discarding the batchall: {}",
                            e
                        );
                        continue 'batches;
                    }
                };

                let op = batch[i].op().unwrap_or_default().to_string();
                let tick = batch[i].tick().unwrap_or_default().to_string();

                // Probe the engine on first sight of a tick.
                if cache.mode_of(&tick).is_none() && !pending_deploys.contains_key(&tick) {
                    match engine.deploy_info(conn, &tick) {
                        Ok(Some(info)) => cache.record(&tick, info.mode),
                        Ok(None) => match payload {
                            Payload::Deploy(ref deploy) => {
                                pending_deploys.insert(tick.clone(), deploy.mode);
                            }
                            _ => {
                                tracing::warn!(
                                    tick = %tick,
                                    "non-deploy op on an undeployed tick, discarding the batchall"
                                );
                                continue 'batches;
                            }
                        },
                        Err(e) if e.is_storage() => return Err(Error::Storage(e.to_string())),
                        Err(e) => {
                            tracing::warn!(tick = %tick, "deploy probe failed: {}", e);
                            continue 'batches;
                        }
                    }
                }

                if !is_supported_tick(&tick) || !is_supported_op(&op) {
                    tracing::warn!(tick = %tick, op = %op, "illegal op or tick, discarding the batchall");
                    continue 'batches;
                }

                // Exclusivity: a deploy or non-owner mint must be alone in
                // its extrinsic, save for one trailing memo.
                let non_owner_mint = op == "mint" && cache.mode_of(&tick) != Some(TickMode::Owner);
                if non_owner_mint || op == "deploy" {
                    if extrinsic_len > 2 {
                        tracing::warn!("illegal ordinary mint or deploy, abandoning the extrinsic");
                        continue 'extrinsics;
                    }
                    if extrinsic_len == 2 && second_op.as_deref() != Some("memo") {
                        tracing::warn!("illegal ordinary mint or deploy, abandoning the extrinsic");
                        continue 'extrinsics;
                    }
                }

                // A memo is only legal as the trailing element of a batch of
                // two or more; fold its text into the batch head and drop it.
                if op == "memo" {
                    if batch.len() == 1 {
                        tracing::warn!("batch is a lone memo, discarding the batchall");
                        continue 'batches;
                    }
                    if i != batch.len() - 1 {
                        tracing::warn!("memo is not in the last position, discarding the batchall");
                        continue 'batches;
                    }
                    let text = batch[i].text.clone();
                    batch[0].memo_remark = Some(text);
                    batch.truncate(batch.len() - 1);
                    break;
                }

                i += 1;
            }

            for (tick, mode) in pending_deploys {
                cache.record(&tick, mode);
            }
            out.extend(batch);
        }
    }

    Ok(out)
}

fn normalize_memo_tick(remark: &mut Remark) {
    // Non-string and non-ASCII ticks are left untouched; they fail the
    // allowlist or deploy probe downstream and take the batch with them.
    if let Some(tick) = remark.memo.get("tick").and_then(Value::as_str) {
        if let Some(normalized) = normalize_tick(tick) {
            remark.memo["tick"] = Value::String(normalized);
        }
    }
}
