//! dot-20 protocol core
//!
//! This crate implements the protocol model shared by the indexer pipeline
//! and the execution engine: remark records, typed operation payloads,
//! the tick allowlist with deploy modes, and SS58 address canonicalization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod error;
pub mod payload;
pub mod remark;
pub mod tick;

pub use address::{canonicalize_address, decode_ss58, encode_ss58};
pub use error::{Error, Result};
pub use payload::{
    is_supported_op, ApprovePayload, DeployPayload, MemoPayload, MintPayload, Payload,
    TransferFromPayload, TransferPayload, PROTOCOL, SUPPORTED_OPS,
};
pub use remark::Remark;
pub use tick::{is_supported_tick, normalize_tick, TickMode, SUPPORTED_TICKS};
