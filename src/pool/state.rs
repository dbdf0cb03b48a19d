//! State Mirror — applies Chain Client event callbacks to the pool
//! snapshot table under the monotonic sequence invariant (§4.3).
//!
//! Grounded on `PoolStateManager` (DashMap-backed concurrent map); the
//! sequence gate is new — the teacher's mirror unconditionally overwrites,
//! which spec §3's "out-of-order deliveries are discarded" invariant
//! forbids.

use crate::chain::{PoolEventData, RawPoolEvent};
use crate::types::{Pool, PoolId, PoolSnapshot};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StateMirror {
    pools: Arc<DashMap<PoolId, Pool>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, pool: Pool) {
        self.pools.insert(pool.id, pool);
    }

    pub fn get(&self, id: &PoolId) -> Option<Pool> {
        self.pools.get(id).map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<Pool> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Apply a raw event to its pool, gated by the monotonic sequence
    /// invariant. Returns `Some(pool_id)` if applied (caller notifies the
    /// Pricing Graph), `None` if the pool is unknown or the event is
    /// stale and was discarded.
    pub fn apply(&self, id: PoolId, event: RawPoolEvent) -> Option<PoolId> {
        let sequence = event.sequence();
        let mut entry = self.pools.get_mut(&id)?;

        if sequence <= entry.sequence {
            debug!(pool = %id, observed = ?sequence, current = ?entry.sequence, "stale pool event discarded");
            return None;
        }

        entry.snapshot = match event.data {
            PoolEventData::V2Sync { reserve0, reserve1 } => PoolSnapshot::V2 { reserve0, reserve1 },
            PoolEventData::V3Swap { sqrt_price_x96, liquidity, tick } => PoolSnapshot::V3 {
                sqrt_price_x96,
                liquidity,
                tick,
            },
        };
        entry.sequence = sequence;
        Some(id)
    }

    /// Decode-and-apply is split from `apply` only by the caller's event
    /// loop; a decode error there is logged and dropped, never reaching
    /// this method, so processing of other events is never suspended
    /// (§4.3 failure semantics).
    pub fn warn_unknown_pool(&self, id: &PoolId) {
        warn!(pool = %id, "event for unregistered pool, dropping");
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PoolEventKind;
    use crate::types::{ChainId, Dex, DexFamily, Sequence, TokenId};
    use alloy::primitives::{Address, U256};

    fn test_pool(id: PoolId) -> Pool {
        Pool {
            id,
            dex: Dex {
                name: "test".to_string(),
                family: DexFamily::V2ConstantProduct,
                router: Address::ZERO,
                factory: Address::ZERO,
                quoter: None,
            },
            token0: TokenId::new(id.chain, Address::ZERO),
            token1: TokenId::new(id.chain, Address::with_last_byte(1)),
            fee_bps: 30,
            token0_decimals: 18,
            token1_decimals: 18,
            snapshot: PoolSnapshot::V2 {
                reserve0: U256::from(1u64),
                reserve1: U256::from(1u64),
            },
            sequence: Sequence(0),
        }
    }

    fn sync_event(reserve0: u64, reserve1: u64, block_number: u64, log_index: u64) -> RawPoolEvent {
        RawPoolEvent {
            pool: Address::ZERO,
            block_number,
            log_index,
            data: PoolEventData::V2Sync {
                reserve0: U256::from(reserve0),
                reserve1: U256::from(reserve1),
            },
        }
    }

    #[test]
    fn test_out_of_order_event_is_discarded() {
        let mirror = StateMirror::new();
        let id = PoolId { chain: ChainId(137), address: Address::ZERO };
        mirror.register(test_pool(id));

        assert!(mirror.apply(id, sync_event(100, 200, 5, 0)).is_some());
        assert!(mirror.apply(id, sync_event(999, 999, 4, 0)).is_none());

        let pool = mirror.get(&id).unwrap();
        match pool.snapshot {
            PoolSnapshot::V2 { reserve0, reserve1 } => {
                assert_eq!(reserve0, U256::from(100u64));
                assert_eq!(reserve1, U256::from(200u64));
            }
            _ => panic!("expected V2 snapshot"),
        }
    }

    #[test]
    fn test_applying_same_sequence_twice_is_idempotent() {
        let mirror = StateMirror::new();
        let id = PoolId { chain: ChainId(137), address: Address::ZERO };
        mirror.register(test_pool(id));

        assert!(mirror.apply(id, sync_event(100, 200, 5, 0)).is_some());
        assert!(mirror.apply(id, sync_event(100, 200, 5, 0)).is_none());
        assert_eq!(mirror.get(&id).unwrap().sequence, Sequence::new(5, 0));
    }

    #[test]
    fn test_unknown_pool_returns_none() {
        let mirror = StateMirror::new();
        let id = PoolId { chain: ChainId(137), address: Address::ZERO };
        assert!(mirror.apply(id, sync_event(1, 1, 1, 0)).is_none());
        let _ = PoolEventKind::V2Sync;
    }
}
