//! Tick identifiers and deploy modes

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticks the indexer materializes. Everything else is dropped at filter time.
pub const SUPPORTED_TICKS: &[&str] = &["dota", "dddd", "idot"];

/// Check a (normalized) tick against the allowlist.
pub fn is_supported_tick(tick: &str) -> bool {
    SUPPORTED_TICKS.contains(&tick)
}

/// Normalize a raw tick to its lowercase ASCII form.
///
/// Returns `None` when the tick contains any non-ASCII character; callers
/// leave such ticks untouched so they fail the allowlist check downstream.
pub fn normalize_tick(raw: &str) -> Option<String> {
    if raw.is_ascii() {
        Some(raw.to_ascii_lowercase())
    } else {
        None
    }
}

/// Issuance mode, fixed at deploy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Per-block issuance is split equally among that block's valid minters.
    Fair,
    /// Each minter requests a bounded amount, one mint per address per block.
    Normal,
    /// Only the deploying account mints.
    Owner,
}

impl TickMode {
    /// String form as persisted in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickMode::Fair => "fair",
            TickMode::Normal => "normal",
            TickMode::Owner => "owner",
        }
    }
}

impl fmt::Display for TickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TickMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fair" => Ok(TickMode::Fair),
            "normal" => Ok(TickMode::Normal),
            "owner" => Ok(TickMode::Owner),
            other => Err(Error::InvalidPayload(format!("unknown mode: {}", other))),
        }
    }
}
