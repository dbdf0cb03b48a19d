//! Arbitrage Detector — Bellman-Ford negative-cycle search plus
//! bounded-depth DFS cycle enumeration (§4.5).
//!
//! No direct teacher counterpart: the teacher's `OpportunityDetector`
//! only ever compares two pools carrying the same symbolic pair. This
//! module generalizes that comparison into a graph-cycle search, keeping
//! the teacher's constants-as-named-constants style and confidence-score
//! shape (threshold-scaled, never a magic literal inline).

use crate::graph::PricingGraph;
use crate::pool::calculator::constant_product_amount_out;
use crate::types::{ArbitrageOpportunity, Edge, PoolId, QuotedLeg, TokenId};
use alloy::primitives::U256;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Liquidity-floor confidence penalty, applied once per thin edge in a
/// cycle (§4.5).
const THIN_EDGE_PENALTY: f64 = 0.8;
/// Per-hop confidence decay beyond the minimum 2-edge cycle (§4.5).
const CYCLE_LENGTH_DECAY: f64 = 0.95;
/// Divisor turning raw profit-bps into the [0,1] confidence seed (§4.5).
const PROFIT_BPS_CONFIDENCE_DIVISOR: f64 = 100.0;

pub struct DetectorConfig {
    pub source_token: TokenId,
    pub input_amount: U256,
    pub min_profit: U256,
    pub max_cycle_len: usize,
    pub liquidity_floor: U256,
    pub opportunity_ttl_ms: u64,
}

pub struct ArbitrageDetector;

impl ArbitrageDetector {
    /// Run both searches, quote every deduplicated candidate, and return
    /// promoted opportunities sorted by the tie-break rule: higher net
    /// profit, then higher confidence, then earlier timestamp.
    pub fn run(graph: &PricingGraph, config: &DetectorConfig, now_ms: u64) -> Vec<ArbitrageOpportunity> {
        let mut candidates: Vec<Vec<Edge>> = Vec::new();
        candidates.extend(Self::bellman_ford_negative_cycles(graph, config.source_token));
        candidates.extend(Self::bounded_dfs_cycles(graph, config.source_token, config.max_cycle_len));

        let deduped = Self::dedup_by_edge_sequence(candidates);

        let mut opportunities: Vec<ArbitrageOpportunity> = deduped
            .into_iter()
            .filter_map(|cycle| Self::quote_and_promote(&cycle, config, now_ms))
            .collect();

        opportunities.sort_by(|a, b| {
            b.expected_profit
                .cmp(&a.expected_profit)
                .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.created_at_ms.cmp(&b.created_at_ms))
        });

        opportunities
    }

    /// Bellman-Ford from `source`: relax all edges `|V|-1` times, then one
    /// extra pass flags vertices still improvable — each lies on or
    /// downstream of a negative cycle. Trace predecessors backward,
    /// truncating at the first repeated vertex, to recover the cycle.
    fn bellman_ford_negative_cycles(graph: &PricingGraph, source: TokenId) -> Vec<Vec<Edge>> {
        let vertices = graph.vertices();
        if vertices.is_empty() {
            return Vec::new();
        }

        let mut dist: HashMap<TokenId, f64> = vertices.iter().map(|&v| (v, f64::INFINITY)).collect();
        let mut pred: HashMap<TokenId, Edge> = HashMap::new();
        dist.insert(source, 0.0);

        let all_edges: Vec<Edge> = vertices.iter().flat_map(|&v| graph.edges_from(v)).collect();

        for _ in 0..vertices.len().saturating_sub(1) {
            let mut changed = false;
            for edge in &all_edges {
                if let Some(&d) = dist.get(&edge.from) {
                    if d.is_finite() {
                        let candidate = d + edge.weight;
                        if candidate < *dist.get(&edge.to).unwrap_or(&f64::INFINITY) {
                            dist.insert(edge.to, candidate);
                            pred.insert(edge.to, edge.clone());
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut on_negative_cycle: HashSet<TokenId> = HashSet::new();
        for edge in &all_edges {
            if let Some(&d) = dist.get(&edge.from) {
                if d.is_finite() && d + edge.weight < *dist.get(&edge.to).unwrap_or(&f64::INFINITY) {
                    on_negative_cycle.insert(edge.to);
                }
            }
        }

        let mut cycles = Vec::new();
        for start in on_negative_cycle {
            if let Some(cycle) = Self::trace_cycle(&pred, start, vertices.len()) {
                cycles.push(cycle);
            }
        }
        cycles
    }

    /// Walk predecessors backward up to `|V|` steps to guarantee landing
    /// inside the cycle, then trace the cycle forward from the first
    /// repeated vertex.
    fn trace_cycle(pred: &HashMap<TokenId, Edge>, start: TokenId, vertex_count: usize) -> Option<Vec<Edge>> {
        let mut current = start;
        for _ in 0..vertex_count {
            current = pred.get(&current)?.from;
        }

        let cycle_start = current;
        let mut edges = Vec::new();
        let mut visited = HashSet::new();
        let mut node = cycle_start;
        loop {
            let edge = pred.get(&node)?;
            edges.push(edge.clone());
            node = edge.from;
            if !visited.insert(node) {
                break;
            }
            if node == cycle_start {
                break;
            }
        }
        edges.reverse();
        Some(edges)
    }

    /// DFS from `source`, cycle length 2..max_len, rejecting paths that
    /// revisit a pool already used earlier in the path (boundary: a cycle
    /// of length 2 through the same pool twice — once in each direction —
    /// must never be emitted; gating on the directional triple alone
    /// lets exactly that pair through, since `(A,B,P)` and `(B,A,P)` are
    /// distinct triples).
    fn bounded_dfs_cycles(graph: &PricingGraph, source: TokenId, max_len: usize) -> Vec<Vec<Edge>> {
        let mut results = Vec::new();
        let mut path: Vec<Edge> = Vec::new();
        let mut visited_pools: HashSet<PoolId> = HashSet::new();
        Self::dfs_step(graph, source, source, max_len, &mut path, &mut visited_pools, &mut results);
        results
    }

    fn dfs_step(
        graph: &PricingGraph,
        source: TokenId,
        current: TokenId,
        max_len: usize,
        path: &mut Vec<Edge>,
        visited_pools: &mut HashSet<PoolId>,
        results: &mut Vec<Vec<Edge>>,
    ) {
        if path.len() >= max_len {
            return;
        }

        for edge in graph.edges_from(current) {
            if visited_pools.contains(&edge.pool) {
                continue;
            }
            if !edge.weight.is_finite() {
                continue;
            }

            visited_pools.insert(edge.pool);
            path.push(edge.clone());

            if edge.to == source && path.len() >= 2 {
                results.push(path.clone());
            } else if path.len() < max_len {
                Self::dfs_step(graph, source, edge.to, max_len, path, visited_pools, results);
            }

            path.pop();
            visited_pools.remove(&edge.pool);
        }
    }

    /// Deduplicate by the ordered sequence of `(pool, sequence)` visited —
    /// the union of the two searches may rediscover the same cycle.
    fn dedup_by_edge_sequence(cycles: Vec<Vec<Edge>>) -> Vec<Vec<Edge>> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for cycle in cycles {
            if cycle.is_empty() {
                continue;
            }
            let identity: Vec<(PoolId, crate::types::Sequence)> =
                cycle.iter().map(|e| (e.pool, e.sequence)).collect();
            if seen.insert(identity) {
                unique.push(cycle);
            }
        }
        unique
    }

    /// Apply each edge's exact constant-product formula sequentially
    /// starting from `config.input_amount`; promote only if the final
    /// output clears `input_amount + min_profit`.
    fn quote_and_promote(cycle: &[Edge], config: &DetectorConfig, now_ms: u64) -> Option<ArbitrageOpportunity> {
        let mut amount = config.input_amount;
        let mut legs = Vec::with_capacity(cycle.len());
        let mut thin_edges = 0u32;

        for edge in cycle {
            let (reserve_in, reserve_out) = edge.reference_reserves;
            if reserve_in < config.liquidity_floor || reserve_out < config.liquidity_floor {
                thin_edges += 1;
            }

            let amount_out = constant_product_amount_out(amount, reserve_in, reserve_out, edge.fee_bps);
            if amount_out.is_zero() {
                return None;
            }

            legs.push(QuotedLeg {
                pool: edge.pool,
                dex_family: edge.dex_family,
                router: edge.router,
                token_in: edge.from,
                token_out: edge.to,
                fee_bps: edge.fee_bps,
                amount_in: amount,
                amount_out,
            });
            amount = amount_out;
        }

        let expected_output = amount;
        if expected_output <= config.input_amount {
            return None;
        }
        let expected_profit = expected_output - config.input_amount;
        if expected_profit < config.min_profit {
            debug!(?expected_profit, "candidate cycle below min profit, discarding");
            return None;
        }

        let profit_bps = if config.input_amount.is_zero() {
            0u64
        } else {
            ((expected_profit * U256::from(10_000u32)) / config.input_amount).to::<u64>()
        };

        let mut confidence = (profit_bps as f64 / PROFIT_BPS_CONFIDENCE_DIVISOR).min(1.0);
        confidence *= CYCLE_LENGTH_DECAY.powi(cycle.len() as i32 - 2);
        confidence *= THIN_EDGE_PENALTY.powi(thin_edges as i32);

        Some(ArbitrageOpportunity {
            chain: cycle[0].from.chain,
            input_token: cycle[0].from,
            input_amount: config.input_amount,
            legs,
            expected_output,
            expected_profit,
            gas_estimate: 0,
            confidence,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + config.opportunity_ttl_ms,
        })
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

    fn pool(id: u8, t0: u8, t1: u8, r0: u128, r1: u128, fee_bps: u32) -> Pool {
        Pool {
            id: PoolId { chain: ChainId(137), address: Address::with_last_byte(100 + id) },
            dex: Dex {
                name: format!("dex{}", id),
                family: DexFamily::V2ConstantProduct,
                router: Address::ZERO,
                factory: Address::ZERO,
                quoter: None,
            },
            token0: token(t0),
            token1: token(t1),
            fee_bps,
            token0_decimals: 18,
            token1_decimals: 18,
            snapshot: PoolSnapshot::V2 { reserve0: U256::from(r0), reserve1: U256::from(r1) },
            sequence: Sequence::new(1, id as u64),
        }
    }

    fn default_config() -> DetectorConfig {
        DetectorConfig {
            source_token: token(1),
            input_amount: U256::from(1_000_000_000_000_000_000u128),
            min_profit: U256::from(1u64),
            max_cycle_len: 3,
            liquidity_floor: U256::from(1u64),
            opportunity_ttl_ms: 2_000,
        }
    }

    #[test]
    fn test_empty_graph_returns_no_opportunities() {
        let graph = PricingGraph::new();
        let config = default_config();
        let result = ArbitrageDetector::run(&graph, &config, 0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_synthetic_triangle_profit_detected() {
        // WETH(1)/USDC(2) at 1:3000, USDC(2)/DAI(3) at 1:1.005, DAI(3)/WETH(1) at 3000:1.
        // 30 bps fee on all three legs; profitable round trip WETH->USDC->DAI->WETH.
        let graph = PricingGraph::new();
        let weth_usdc = pool(1, 1, 2, 1_000_000_000_000_000_000, 3_000_000_000_000_000_000_000u128, 30);
        graph.apply_pool(&weth_usdc);
        let usdc_dai = pool(2, 2, 3, 1_000_000_000_000_000_000_000, 1_005_000_000_000_000_000_000, 30);
        graph.apply_pool(&usdc_dai);
        let dai_weth = pool(3, 3, 1, 3_000_000_000_000_000_000_000, 1_000_000_000_000_000_000, 30);
        graph.apply_pool(&dai_weth);

        let mut config = default_config();
        config.min_profit = U256::ZERO;
        let result = ArbitrageDetector::run(&graph, &config, 0);

        assert!(!result.is_empty());
        let best = &result[0];
        assert_eq!(best.cycle_length(), 3);
        assert!(best.expected_profit > U256::ZERO);
        assert!(best.confidence > 0.0);
    }

    #[test]
    fn test_same_pool_twice_never_emitted_in_dfs() {
        let graph = PricingGraph::new();
        graph.apply_pool(&pool(1, 1, 2, 1_000_000, 1_000_000, 30));

        let cycles = ArbitrageDetector::bounded_dfs_cycles(&graph, token(1), 3);
        for cycle in &cycles {
            let mut seen_pools = HashSet::new();
            for edge in cycle {
                assert!(seen_pools.insert(edge.pool), "same pool revisited within one cycle");
            }
        }
    }

    #[test]
    fn test_no_arbitrage_balanced_graph_returns_empty() {
        let graph = PricingGraph::new();
        // Symmetric fees make every round trip strictly lossy; no cycle
        // should clear the min-profit bar.
        graph.apply_pool(&pool(1, 1, 2, 1_000_000_000_000u128, 1_000_000_000_000u128, 30));
        graph.apply_pool(&pool(2, 2, 1, 1_000_000_000_000u128, 1_000_000_000_000u128, 30));

        let config = default_config();
        let result = ArbitrageDetector::run(&graph, &config, 0);
        assert!(result.is_empty());
    }
}
