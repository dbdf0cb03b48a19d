//! Route-Level Cooldown — suppress failed arbitrage routes with escalating
//! backoff.
//!
//! Purpose:
//!     Prevents the engine from re-submitting the same failed cycle every
//!     block. Structurally dead routes quickly reach max cooldown (~30 min)
//!     while legitimate temporary failures recover in ~20s.
//!
//! Author: AI-Generated
//! Created: 2026-01-31
//! Modified: 2026-07-29 — re-keyed from a fixed (pair, buy_dex, sell_dex)
//! triple to an N-leg route identity (the ordered pool sequence a cycle
//! visits), so the same backoff mechanics apply to any cycle length.
//!
//! Design:
//!     - Route key: the ordered `Vec<PoolId>` a cycle visits (§4.5 route
//!       identity)
//!     - Escalating backoff: initial → 5× → 5× → cap (default: 10 → 50 →
//!       250 → 1250 → 1800 blocks)
//!     - On success: entry removed (instant reset)
//!     - Periodic cleanup removes expired entries to bound memory

use std::collections::HashMap;
use tracing::{debug, info};

use crate::types::PoolId;

/// Unique identifier for a route: the ordered sequence of pools it visits.
type RouteKey = Vec<PoolId>;

/// Tracks cooldown state for a single route.
struct CooldownEntry {
    last_failed_block: u64,
    cooldown_blocks: u64,
    failure_count: u32,
}

/// Route-level cooldown tracker with escalating backoff.
pub struct RouteCooldown {
    entries: HashMap<RouteKey, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

/// Escalation multiplier per failure (5x each step).
const ESCALATION_FACTOR: u64 = 5;

/// Maximum cooldown cap in blocks (~1 hour on Polygon with ~2s blocks).
const DEFAULT_MAX_COOLDOWN: u64 = 1800;

impl RouteCooldown {
    /// Create a new cooldown tracker. `initial_cooldown` = blocks to
    /// suppress after first failure (0 = disabled).
    pub fn new(initial_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
        }
    }

    /// Returns true if this route is currently suppressed (in cooldown).
    /// Returns false if no entry exists or cooldown has expired.
    pub fn is_cooled_down(&self, route: &[PoolId], current_block: u64) -> bool {
        if self.initial_cooldown == 0 {
            return false;
        }

        if let Some(entry) = self.entries.get(route) {
            let expires_at = entry.last_failed_block + entry.cooldown_blocks;
            current_block < expires_at
        } else {
            false
        }
    }

    /// Record a failure for this route. Creates or escalates the cooldown.
    /// Escalation: initial -> initial x5 -> initial x25 -> ... -> max_cooldown.
    pub fn record_failure(&mut self, route: &[PoolId], block: u64) {
        if self.initial_cooldown == 0 {
            return;
        }

        let key = route.to_vec();
        let entry = self.entries.entry(key).or_insert_with(|| CooldownEntry {
            last_failed_block: block,
            cooldown_blocks: 0,
            failure_count: 0,
        });

        entry.failure_count += 1;
        entry.last_failed_block = block;

        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        entry.cooldown_blocks = escalated.min(self.max_cooldown);

        debug!(
            cycle_length = route.len(),
            failure_count = entry.failure_count,
            cooldown_blocks = entry.cooldown_blocks,
            "route cooldown escalated"
        );
    }

    /// Record a success — removes the cooldown entry entirely (instant
    /// reset).
    pub fn record_success(&mut self, route: &[PoolId]) {
        if self.entries.remove(route).is_some() {
            info!(cycle_length = route.len(), "route cooldown reset, trade succeeded");
        }
    }

    /// Remove expired entries to bound memory usage. Call periodically
    /// (e.g. every ~100 blocks).
    pub fn cleanup(&mut self, current_block: u64) {
        let before = self.entries.len();
        self.entries.retain(|_key, entry| {
            let expires_at = entry.last_failed_block + entry.cooldown_blocks;
            current_block < expires_at
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "route cooldown cleanup");
        }
    }

    /// Number of currently active (non-expired) cooldown entries.
    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;
    use alloy::primitives::Address;

    fn route(ids: &[u8]) -> Vec<PoolId> {
        ids.iter()
            .map(|&id| PoolId { chain: ChainId(137), address: Address::with_last_byte(id) })
            .collect()
    }

    #[test]
    fn test_no_cooldown_initially() {
        let cd = RouteCooldown::new(10);
        assert!(!cd.is_cooled_down(&route(&[1, 2]), 100));
    }

    #[test]
    fn test_cooldown_after_failure() {
        let mut cd = RouteCooldown::new(10);
        let r = route(&[1, 2]);
        cd.record_failure(&r, 100);

        assert!(cd.is_cooled_down(&r, 100));
        assert!(cd.is_cooled_down(&r, 109));
        assert!(!cd.is_cooled_down(&r, 110));
    }

    #[test]
    fn test_escalating_backoff() {
        let mut cd = RouteCooldown::new(10);
        let r = route(&[1, 2, 3]);

        cd.record_failure(&r, 100);
        assert!(cd.is_cooled_down(&r, 109));
        assert!(!cd.is_cooled_down(&r, 110));

        cd.record_failure(&r, 200);
        assert!(cd.is_cooled_down(&r, 249));
        assert!(!cd.is_cooled_down(&r, 250));

        cd.record_failure(&r, 300);
        assert!(cd.is_cooled_down(&r, 549));
        assert!(!cd.is_cooled_down(&r, 550));

        cd.record_failure(&r, 600);
        assert!(cd.is_cooled_down(&r, 1849));
        assert!(!cd.is_cooled_down(&r, 1850));

        cd.record_failure(&r, 2000);
        assert!(cd.is_cooled_down(&r, 3799));
        assert!(!cd.is_cooled_down(&r, 3800));

        // Cap holds on further failures.
        cd.record_failure(&r, 4000);
        assert!(cd.is_cooled_down(&r, 5799));
        assert!(!cd.is_cooled_down(&r, 5800));
    }

    #[test]
    fn test_success_resets_cooldown() {
        let mut cd = RouteCooldown::new(10);
        let r = route(&[4, 5]);

        cd.record_failure(&r, 100);
        assert!(cd.is_cooled_down(&r, 101));

        cd.record_success(&r);
        assert!(!cd.is_cooled_down(&r, 101));
        assert_eq!(cd.active_count(), 0);
    }

    #[test]
    fn test_different_routes_independent() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure(&route(&[1, 2]), 100);

        assert!(!cd.is_cooled_down(&route(&[1, 3]), 101));
        assert!(!cd.is_cooled_down(&route(&[2, 1]), 101));
    }

    #[test]
    fn test_disabled_when_zero() {
        let mut cd = RouteCooldown::new(0);
        let r = route(&[1, 2]);
        cd.record_failure(&r, 100);
        assert!(!cd.is_cooled_down(&r, 100));
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure(&route(&[1, 2]), 100);
        cd.record_failure(&route(&[3, 4]), 200);

        assert_eq!(cd.active_count(), 2);

        cd.cleanup(111);
        assert_eq!(cd.active_count(), 1);

        cd.cleanup(211);
        assert_eq!(cd.active_count(), 0);
    }
}
