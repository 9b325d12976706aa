//! Environment configuration
//!
//! Read once at startup; the core components receive their dependencies
//! explicitly and never consult the environment themselves.

use crate::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Default finalized-head lag in blocks.
pub const DEFAULT_DELAY_BLOCKS: u64 = 2;

/// Default log rotation period in days.
pub const DEFAULT_ROTATION_DAYS: u64 = 1;

/// Default log retention in weeks.
pub const DEFAULT_RETENTION_WEEKS: u64 = 4;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the decoded-block API.
    pub url: String,
    /// Expected chain identifier; mismatch aborts startup.
    pub chain: String,
    /// Path of the sqlite database file.
    pub database: PathBuf,
    /// Initial block when no cursor row exists yet.
    pub start_block: Option<u64>,
    /// Finalized-head lag in blocks.
    pub delay_blocks: u64,
    /// SS58 network prefix used to canonicalize addresses.
    pub ss58_prefix: u16,
    /// Log rotation period in days.
    pub rotation_days: u64,
    /// Log retention in weeks.
    pub retention_weeks: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: require("URL")?,
            chain: require("CHAIN")?,
            database: PathBuf::from(require("DATABASE")?),
            start_block: parse_optional("START_BLOCK")?,
            delay_blocks: parse_optional("DELAY_BLOCK")?.unwrap_or(DEFAULT_DELAY_BLOCKS),
            ss58_prefix: parse_optional("SS58_PREFIX")?.unwrap_or(0),
            rotation_days: parse_optional("ROTATION")?.unwrap_or(DEFAULT_ROTATION_DAYS),
            // Env name kept as deployed configs spell it.
            retention_weeks: parse_optional("RENTENTION")?.unwrap_or(DEFAULT_RETENTION_WEEKS),
        })
    }
}

fn require(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{} is not set", name))),
    }
}

fn parse_optional<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid value: {}", name, v))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // cannot race each other under the parallel test runner.
    #[test]
    fn test_from_env() {
        for key in [
            "URL",
            "CHAIN",
            "DATABASE",
            "START_BLOCK",
            "DELAY_BLOCK",
            "SS58_PREFIX",
            "ROTATION",
            "RENTENTION",
        ] {
            env::remove_var(key);
        }

        assert!(matches!(Config::from_env(), Err(Error::Config(_))));

        env::set_var("URL", "http://localhost:8080");
        env::set_var("CHAIN", "Polkadot");
        env::set_var("DATABASE", "/tmp/dot20.sqlite");
        let config = Config::from_env().unwrap();
        assert_eq!(config.delay_blocks, DEFAULT_DELAY_BLOCKS);
        assert_eq!(config.start_block, None);
        assert_eq!(config.ss58_prefix, 0);

        env::set_var("START_BLOCK", "1000");
        env::set_var("DELAY_BLOCK", "5");
        env::set_var("SS58_PREFIX", "2");
        let config = Config::from_env().unwrap();
        assert_eq!(config.start_block, Some(1000));
        assert_eq!(config.delay_blocks, 5);
        assert_eq!(config.ss58_prefix, 2);

        env::set_var("DELAY_BLOCK", "not-a-number");
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        env::remove_var("DELAY_BLOCK");
    }
}
