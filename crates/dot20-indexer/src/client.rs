//! Decoded-block API client
//!
//! The indexer does not decode extrinsics itself; it consumes a sidecar-style
//! companion API that serves finalized-head info and blocks with decoded
//! extrinsics as JSON. This client pulls those, extracts dot-20 remark
//! candidates (direct `system.remark*` calls and one nesting level of
//! `utility.batch*`), canonicalizes origins, and hands ordered [`Remark`]
//! lists to the pipeline.

use crate::{Error, Result};
use async_trait::async_trait;
use dot20_core::{canonicalize_address, Remark, PROTOCOL};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Request timeout for the block API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of dot-20 remarks for finalized blocks.
#[async_trait]
pub trait RemarkSource {
    /// Identifier of the connected chain, checked against configuration.
    async fn chain_name(&self) -> Result<String>;

    /// Height of the latest finalized block.
    async fn finalized_head_number(&self) -> Result<u64>;

    /// Ordered dot-20 remarks for one block.
    async fn remarks_at(&self, block_num: u64) -> Result<Vec<Remark>>;
}

/// HTTP client over the decoded-block API.
pub struct SidecarClient {
    base_url: String,
    http: reqwest::Client,
    ss58_prefix: u16,
}

#[derive(Debug, Deserialize)]
struct NodeVersion {
    chain: String,
}

#[derive(Debug, Deserialize)]
struct BlockHead {
    number: String,
}

#[derive(Debug, Deserialize)]
struct Block {
    extrinsics: Vec<Extrinsic>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Extrinsic {
    method: MethodCall,
    #[serde(default)]
    signature: Option<Signature>,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct MethodCall {
    pallet: String,
    method: String,
}

#[derive(Debug, Deserialize)]
struct Signature {
    signer: Signer,
}

#[derive(Debug, Deserialize)]
struct Signer {
    id: String,
}

impl SidecarClient {
    /// Create a client for the given API base URL.
    pub fn new(base_url: impl Into<String>, ss58_prefix: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            ss58_prefix,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemarkSource for SidecarClient {
    async fn chain_name(&self) -> Result<String> {
        let version: NodeVersion = self.get_json("/node/version").await?;
        Ok(version.chain)
    }

    async fn finalized_head_number(&self) -> Result<u64> {
        let head: BlockHead = self.get_json("/blocks/head/finalized").await?;
        head.number
            .parse()
            .map_err(|_| Error::Network(format!("bad head number: {}", head.number)))
    }

    async fn remarks_at(&self, block_num: u64) -> Result<Vec<Remark>> {
        let block: Block = self.get_json(&format!("/blocks/{}", block_num)).await?;
        Ok(extract_remarks(block_num, &block.extrinsics, self.ss58_prefix))
    }
}

/// Extract ordered dot-20 remark candidates from a block's extrinsics.
pub(crate) fn extract_remarks(
    block_num: u64,
    extrinsics: &[Extrinsic],
    ss58_prefix: u16,
) -> Vec<Remark> {
    let mut remarks = Vec::new();

    for (extrinsic_index, extrinsic) in extrinsics.iter().enumerate() {
        let signer = match &extrinsic.signature {
            Some(signature) => &signature.signer.id,
            // Unsigned extrinsics cannot carry dot-20 operations.
            None => continue,
        };
        let origin = match canonicalize_address(signer, ss58_prefix) {
            Ok(origin) => origin,
            Err(e) => {
                tracing::debug!("skipping extrinsic with undecodable signer: {}", e);
                continue;
            }
        };

        let extrinsic_index = extrinsic_index as u32;
        if is_remark_call(&extrinsic.method) {
            push_remark(
                &mut remarks,
                block_num,
                extrinsic_index,
                0,
                &origin,
                &extrinsic.args,
            );
        } else if is_batch_call(&extrinsic.method) {
            let calls = extrinsic
                .args
                .get("calls")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            // Direct remark members of the top batch share index 0; every
            // nested batch call gets a fresh batch index for its members.
            let mut next_batch_index = 1;
            for call in calls {
                let (method, args) = match split_call(call) {
                    Some(parts) => parts,
                    None => continue,
                };
                if is_remark_call(&method) {
                    push_remark(&mut remarks, block_num, extrinsic_index, 0, &origin, args);
                } else if is_batch_call(&method) {
                    let batch_index = next_batch_index;
                    next_batch_index += 1;
                    let inner = args.get("calls").and_then(Value::as_array);
                    for inner_call in inner.map(Vec::as_slice).unwrap_or(&[]) {
                        if let Some((inner_method, inner_args)) = split_call(inner_call) {
                            if is_remark_call(&inner_method) {
                                push_remark(
                                    &mut remarks,
                                    block_num,
                                    extrinsic_index,
                                    batch_index,
                                    &origin,
                                    inner_args,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    remarks
}

fn is_remark_call(method: &MethodCall) -> bool {
    method.pallet == "system" && (method.method == "remark" || method.method == "remarkWithEvent")
}

fn is_batch_call(method: &MethodCall) -> bool {
    method.pallet == "utility"
        && (method.method == "batchAll" || method.method == "batch" || method.method == "forceBatch")
}

fn split_call(call: &Value) -> Option<(MethodCall, &Value)> {
    let method = serde_json::from_value(call.get("method")?.clone()).ok()?;
    Some((method, call.get("args")?))
}

fn push_remark(
    remarks: &mut Vec<Remark>,
    block_num: u64,
    extrinsic_index: u32,
    batchall_index: u32,
    origin: &str,
    args: &Value,
) {
    let raw = match args.get("remark").and_then(Value::as_str) {
        Some(raw) => raw,
        None => return,
    };
    let text = match decode_remark_text(raw) {
        Some(text) => text,
        None => return,
    };
    let memo: Value = match serde_json::from_str(&text) {
        Ok(memo @ Value::Object(_)) => memo,
        _ => return,
    };
    if memo.get("p").and_then(Value::as_str) != Some(PROTOCOL) {
        return;
    }

    // For memo ops the free text is the payload's text field; every other
    // op keeps the raw remark string.
    let text = if memo.get("op").and_then(Value::as_str) == Some("memo") {
        memo.get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        text
    };

    remarks.push(Remark {
        block_num,
        extrinsic_index,
        batchall_index,
        origin: origin.to_string(),
        memo,
        text,
        memo_remark: None,
    });
}

/// Remarks arrive hex-encoded (`0x…`) or as plain strings.
fn decode_remark_text(raw: &str) -> Option<String> {
    if let Some(stripped) = raw.strip_prefix("0x") {
        let bytes = hex::decode(stripped).ok()?;
        String::from_utf8(bytes).ok()
    } else {
        Some(raw.to_string())
    }
}
