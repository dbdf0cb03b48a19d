//! Pricing Graph — a directed multigraph over tokens of a single chain
//! (§4.4). Each chain owns an independent graph; there is no cross-chain
//! edge.
//!
//! No direct teacher counterpart (the teacher only ever compares two
//! pools for the same symbolic pair); grounded on `pool::calculator`'s
//! rate math for the weight formula and on the teacher's general
//! per-pool-keyed locking idiom for the atomic edge-pair replacement.

use crate::pool::calculator::{rate_and_weight, v3_spot_price, v3_virtual_reserves};
use crate::types::{DexFamily, Edge, Pool, PoolSnapshot, TokenId};
use dashmap::DashMap;
use std::sync::Arc;

/// Reference input used for the `-ln(rate)` weight transform: 1 unit in
/// 18-decimal precision (spec §4.4 default "1 unit of the source token in
/// its native precision" — 18 decimals covers the large majority of
/// tokens this engine trades; pools denominated in low-decimal
/// stablecoins still produce a usable, if coarser, weight).
const REFERENCE_INPUT: u128 = 1_000_000_000_000_000_000;

/// Both directions' edges for one pool, replaced together under one write
/// lock so no reader ever observes one direction updated and the other
/// stale (§4.4 invariant). The lock's critical section only assigns two
/// already-computed edges — no I/O, never suspends (§5).
struct EdgePair {
    forward: Edge,
    backward: Edge,
}

pub struct PricingGraph {
    /// adjacency: token -> outgoing edges, keyed by pool for O(1) removal
    /// on pool replacement.
    by_token: DashMap<TokenId, Vec<Arc<EdgePairHandle>>>,
    by_pool: DashMap<crate::types::PoolId, Arc<EdgePairHandle>>,
}

/// Shared handle so `by_token` adjacency lists and `by_pool` index both
/// see the same replaced edges without double-storing them.
struct EdgePairHandle {
    inner: std::sync::RwLock<EdgePair>,
}

impl PricingGraph {
    pub fn new() -> Self {
        Self {
            by_token: DashMap::new(),
            by_pool: DashMap::new(),
        }
    }

    /// Compute and atomically install both directed edges for a pool's
    /// current snapshot. Call on initial discovery and on every State
    /// Mirror update.
    pub fn apply_pool(&self, pool: &Pool) {
        let (forward, backward) = Self::build_edges(pool);

        if let Some(existing) = self.by_pool.get(&pool.id) {
            let mut inner = existing.inner.write().unwrap();
            inner.forward = forward;
            inner.backward = backward;
            return;
        }

        let handle = Arc::new(EdgePairHandle {
            inner: std::sync::RwLock::new(EdgePair { forward, backward }),
        });

        self.by_pool.insert(pool.id, handle.clone());
        self.by_token.entry(pool.token0).or_default().push(handle.clone());
        self.by_token.entry(pool.token1).or_default().push(handle);
    }

    fn build_edges(pool: &Pool) -> (Edge, Edge) {
        let (reserve0, reserve1) = match &pool.snapshot {
            PoolSnapshot::V2 { reserve0, reserve1 } => (*reserve0, *reserve1),
            PoolSnapshot::V3 { sqrt_price_x96, liquidity, .. } => v3_virtual_reserves(*sqrt_price_x96, *liquidity),
        };

        let delta = alloy::primitives::U256::from(REFERENCE_INPUT);
        let (_, weight_forward) = rate_and_weight(delta, reserve0, reserve1, pool.fee_bps);
        let (_, weight_backward) = rate_and_weight(delta, reserve1, reserve0, pool.fee_bps);

        // v3 weight is refined against the spot price per §4.4 ("the
        // weight reflects the spot rate less the fee tier") rather than
        // the virtual-reserve quote alone, when the pool reports a usable
        // sqrtPrice.
        let (weight_forward, weight_backward) = if pool.dex.family == DexFamily::V3Concentrated {
            if let PoolSnapshot::V3 { sqrt_price_x96, .. } = &pool.snapshot {
                let spot = v3_spot_price(*sqrt_price_x96);
                if spot > 0.0 {
                    let fee_factor = 1.0 - (pool.fee_bps as f64 / 10_000.0);
                    (-(spot * fee_factor).ln(), -((1.0 / spot) * fee_factor).ln())
                } else {
                    (weight_forward, weight_backward)
                }
            } else {
                (weight_forward, weight_backward)
            }
        } else {
            (weight_forward, weight_backward)
        };

        let forward = Edge {
            from: pool.token0,
            to: pool.token1,
            pool: pool.id,
            dex_family: pool.dex.family,
            fee_bps: pool.fee_bps,
            router: pool.dex.router,
            reference_reserves: (reserve0, reserve1),
            weight: weight_forward,
            sequence: pool.sequence,
        };
        let backward = Edge {
            from: pool.token1,
            to: pool.token0,
            pool: pool.id,
            dex_family: pool.dex.family,
            fee_bps: pool.fee_bps,
            router: pool.dex.router,
            reference_reserves: (reserve1, reserve0),
            weight: weight_backward,
            sequence: pool.sequence,
        };
        (forward, backward)
    }

    pub fn edges_from(&self, token: TokenId) -> Vec<Edge> {
        self.by_token
            .get(&token)
            .map(|handles| {
                handles
                    .iter()
                    .map(|h| {
                        let inner = h.inner.read().unwrap();
                        if inner.forward.from == token {
                            inner.forward.clone()
                        } else {
                            inner.backward.clone()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn vertices(&self) -> Vec<TokenId> {
        self.by_token.iter().map(|e| *e.key()).collect()
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.by_pool
            .iter()
            .flat_map(|e| {
                let inner = e.value().inner.read().unwrap();
                vec![inner.forward.clone(), inner.backward.clone()]
            })
            .collect()
    }
}

impl Default for PricingGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainId, Dex, PoolId, Sequence};
    use alloy::primitives::{Address, U256};

    fn v2_pool(id: u8, reserve0: u64, reserve1: u64) -> Pool {
        Pool {
            id: PoolId { chain: ChainId(137), address: Address::with_last_byte(id) },
            dex: Dex {
                name: "test".to_string(),
                family: DexFamily::V2ConstantProduct,
                router: Address::ZERO,
                factory: Address::ZERO,
                quoter: None,
            },
            token0: TokenId::new(ChainId(137), Address::with_last_byte(1)),
            token1: TokenId::new(ChainId(137), Address::with_last_byte(2)),
            fee_bps: 30,
            token0_decimals: 18,
            token1_decimals: 18,
            snapshot: PoolSnapshot::V2 {
                reserve0: U256::from(reserve0),
                reserve1: U256::from(reserve1),
            },
            sequence: Sequence(0),
        }
    }

    #[test]
    fn test_apply_pool_creates_both_directions() {
        let graph = PricingGraph::new();
        graph.apply_pool(&v2_pool(1, 1_000_000, 2_000_000));

        let token0 = TokenId::new(ChainId(137), Address::with_last_byte(1));
        let token1 = TokenId::new(ChainId(137), Address::with_last_byte(2));
        assert_eq!(graph.edges_from(token0).len(), 1);
        assert_eq!(graph.edges_from(token1).len(), 1);
    }

    #[test]
    fn test_apply_pool_replaces_edges_atomically_on_update() {
        let graph = PricingGraph::new();
        let mut pool = v2_pool(1, 1_000_000, 2_000_000);
        graph.apply_pool(&pool);

        pool.snapshot = PoolSnapshot::V2 {
            reserve0: U256::from(500_000u64),
            reserve1: U256::from(4_000_000u64),
        };
        pool.sequence = Sequence(1);
        graph.apply_pool(&pool);

        let token0 = TokenId::new(ChainId(137), Address::with_last_byte(1));
        let edges = graph.edges_from(token0);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].reference_reserves.0, U256::from(500_000u64));
    }

    #[test]
    fn test_empty_graph_has_no_vertices() {
        let graph = PricingGraph::new();
        assert!(graph.vertices().is_empty());
        assert!(graph.all_edges().is_empty());
    }
}
