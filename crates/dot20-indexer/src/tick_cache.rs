//! Process-lifetime tick-mode cache

use dot20_core::TickMode;
use std::collections::HashMap;

/// Cache of `tick → mode`, seeded lazily from the engine on first sight.
///
/// Advisory for validation only; authoritative mode checks go through the
/// engine at apply time. Entries are never evicted and never change: the
/// mode is fixed at deploy and deploys are unique per tick.
#[derive(Debug, Default)]
pub struct TickModeCache {
    modes: HashMap<String, TickMode>,
}

impl TickModeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mode for a tick, if seen.
    pub fn mode_of(&self, tick: &str) -> Option<TickMode> {
        self.modes.get(tick).copied()
    }

    /// Record a tick's mode. First write wins.
    pub fn record(&mut self, tick: &str, mode: TickMode) {
        self.modes.entry(tick.to_string()).or_insert(mode);
    }
}
