//! Alert de-duplication.
//!
//! Suppresses repeats of the same (symbol, turn type) pair within a cooldown
//! window. Different turn types never suppress each other.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::types::TurnType;

/// Minimum time between two alerts of the same type for the same symbol.
pub const DEDUP_COOLDOWN_SECS: i64 = 3 * 60;

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    turn: TurnType,
    emitted_at: DateTime<Utc>,
}

/// Per-symbol record of the last emitted alert.
#[derive(Debug)]
pub struct AlertDeduplicator {
    cooldown: Duration,
    last: HashMap<String, DedupEntry>,
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(Duration::seconds(DEDUP_COOLDOWN_SECS))
    }
}

impl AlertDeduplicator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: HashMap::new(),
        }
    }

    /// Check against the wall clock. See [`Self::should_suppress_at`].
    pub fn should_suppress(&mut self, symbol: &str, turn: TurnType) -> bool {
        self.should_suppress_at(symbol, turn, Utc::now())
    }

    /// Returns `true` if the alert should be dropped.
    ///
    /// When not suppressed, records `(turn, now)` as the symbol's last alert.
    pub fn should_suppress_at(
        &mut self,
        symbol: &str,
        turn: TurnType,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(entry) = self.last.get(symbol) {
            if entry.turn == turn && now - entry.emitted_at < self.cooldown {
                return true;
            }
        }

        self.last.insert(
            symbol.to_string(),
            DedupEntry {
                turn,
                emitted_at: now,
            },
        );
        false
    }

    /// Forget records whose cooldown has elapsed. They can no longer
    /// suppress anything. Returns how many were removed.
    pub fn prune_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last.len();
        let cooldown = self.cooldown;
        self.last.retain(|_, entry| now - entry.emitted_at < cooldown);
        before - self.last.len()
    }

    pub fn prune_expired(&mut self) -> usize {
        self.prune_expired_at(Utc::now())
    }

    /// Number of symbols with a recorded alert.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
