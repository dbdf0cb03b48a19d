//! USD price oracle — stablecoin-anchored valuation for pipeline filtering
//! and execution-record bookkeeping (§4.6, §7).
//!
//! Grounded on `tax::price_oracle::PriceOracle` (stablecoin peg shortcut,
//! RwLock-backed TTL cache) but reads live prices off the Pricing Graph
//! instead of a pool-state JSON snapshot file, so the oracle stays current
//! with the same data the detector uses.

use crate::graph::PricingGraph;
use crate::pool::calculator::constant_product_amount_out;
use crate::types::TokenId;
use alloy::primitives::U256;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// USD valuation for a token amount. Implementations may fail open
/// (return `None`) when no price path is known; callers must treat that
/// as "proceed with native-unit evaluation only" (§4.6), never as zero.
pub trait PriceOracle: Send + Sync {
    fn usd_value(&self, token: TokenId, amount: U256, decimals: u8) -> Option<f64>;
}

/// Anchors valuation on a single stablecoin per chain; derives a token's
/// USD rate from the best one-hop edge to that stablecoin in the Pricing
/// Graph, caching the derived rate for `cache_ttl`.
pub struct GraphPriceOracle {
    graph: std::sync::Arc<PricingGraph>,
    stablecoin: TokenId,
    stablecoin_decimals: u8,
    cache: RwLock<HashMap<TokenId, (f64, Instant)>>,
    cache_ttl: Duration,
}

impl GraphPriceOracle {
    pub fn new(graph: std::sync::Arc<PricingGraph>, stablecoin: TokenId, stablecoin_decimals: u8) -> Self {
        Self {
            graph,
            stablecoin,
            stablecoin_decimals,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(5),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// USD value of one native unit (10^decimals raw) of `token`.
    fn rate_usd_per_unit(&self, token: TokenId, decimals: u8) -> Option<f64> {
        if token == self.stablecoin {
            return Some(1.0);
        }

        if let Some(&(rate, seen_at)) = self.cache.read().unwrap().get(&token) {
            if seen_at.elapsed() < self.cache_ttl {
                return Some(rate);
            }
        }

        let one_unit = U256::from(10u128).pow(U256::from(decimals));
        let edge = self
            .graph
            .edges_from(token)
            .into_iter()
            .find(|e| e.to == self.stablecoin)?;

        let (reserve_in, reserve_out) = edge.reference_reserves;
        let quote = constant_product_amount_out(one_unit, reserve_in, reserve_out, edge.fee_bps);
        if quote.is_zero() {
            return None;
        }

        let stable_unit = 10f64.powi(self.stablecoin_decimals as i32);
        let rate = quote.to::<u128>() as f64 / stable_unit;

        self.cache.write().unwrap().insert(token, (rate, Instant::now()));
        Some(rate)
    }
}

impl PriceOracle for GraphPriceOracle {
    fn usd_value(&self, token: TokenId, amount: U256, decimals: u8) -> Option<f64> {
        let rate = self.rate_usd_per_unit(token, decimals)?;
        let unit = 10f64.powi(decimals as i32);
        let native_amount = amount.to::<u128>() as f64 / unit;
        Some(native_amount * rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainId, Dex, DexFamily, Pool, PoolId, PoolSnapshot, Sequence};
    use alloy::primitives::Address;

    fn token(n: u8) -> TokenId {
        TokenId::new(ChainId(137), Address::with_last_byte(n))
    }

    #[test]
    fn test_stablecoin_is_always_one_dollar() {
        let graph = std::sync::Arc::new(PricingGraph::new());
        let oracle = GraphPriceOracle::new(graph, token(1), 6);
        let value = oracle.usd_value(token(1), U256::from(5_000_000u64), 6).unwrap();
        assert!((value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_derives_price_from_one_hop_edge() {
        let graph = std::sync::Arc::new(PricingGraph::new());
        let pool = Pool {
            id: PoolId { chain: ChainId(137), address: Address::with_last_byte(9) },
            dex: Dex {
                name: "test".to_string(),
                family: DexFamily::V2ConstantProduct,
                router: Address::ZERO,
                factory: Address::ZERO,
                quoter: None,
            },
            token0: token(2),
            token1: token(1),
            fee_bps: 30,
            token0_decimals: 18,
            token1_decimals: 6,
            snapshot: PoolSnapshot::V2 {
                reserve0: U256::from(1_000_000_000_000_000_000u128), // 1 WETH
                reserve1: U256::from(3_000_000_000u64),              // 3000 USDC
            },
            sequence: Sequence::new(1, 0),
        };
        graph.apply_pool(&pool);

        let oracle = GraphPriceOracle::new(graph, token(1), 6);
        let value = oracle.usd_value(token(2), U256::from(1_000_000_000_000_000_000u128), 18).unwrap();
        assert!(value > 2_500.0 && value < 3_000.0, "expected ~2985 after fee, got {}", value);
    }

    #[test]
    fn test_unknown_token_returns_none() {
        let graph = std::sync::Arc::new(PricingGraph::new());
        let oracle = GraphPriceOracle::new(graph, token(1), 6);
        assert!(oracle.usd_value(token(99), U256::from(1u64), 18).is_none());
    }
}
