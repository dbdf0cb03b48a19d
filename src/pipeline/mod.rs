//! Opportunity Pipeline — bounded per-chain queue between the Detector and
//! the Simulator/Executor (§4.6).
//!
//! No direct teacher counterpart; grounded on `mempool::types::ConfirmationTracker`'s
//! TTL-tracked-item pattern (HashMap keyed by identity, `retain`-based
//! cleanup) for the dedup/expiry bookkeeping, and on `arbitrage::cooldown`'s
//! escalation-entry shape for the "one HashMap entry per route identity"
//! idiom.

use crate::oracle::PriceOracle;
use crate::types::ArbitrageOpportunity;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, warn};

pub struct PipelineConfig {
    /// Bounded FIFO capacity; a full queue drops the incoming opportunity
    /// (oldest-favored backpressure, matches at-most-one-in-flight-tx
    /// discipline downstream).
    pub capacity: usize,
    /// Two enqueues of the same route identity within this window are
    /// treated as one (§4.6 dedup).
    pub dedup_window_ms: u64,
    /// Minimum USD value an opportunity must clear on dequeue when an
    /// oracle is available; ignored if the oracle can't price the route.
    pub min_profit_usd: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            dedup_window_ms: 500,
            min_profit_usd: 0.0,
        }
    }
}

struct Inner {
    queue: VecDeque<ArbitrageOpportunity>,
    last_enqueued_at_ms: HashMap<Vec<crate::types::PoolId>, u64>,
}

/// Single-chain opportunity queue. One instance per chain (§5: no
/// cross-chain sharing).
pub struct OpportunityPipeline {
    inner: Mutex<Inner>,
    config: PipelineConfig,
}

impl OpportunityPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                last_enqueued_at_ms: HashMap::new(),
            }),
            config,
        }
    }

    /// Enqueue one opportunity. Returns false if deduped (same route
    /// identity seen within the dedup window) or if the queue is full.
    pub fn enqueue(&self, opportunity: ArbitrageOpportunity, now_ms: u64) -> bool {
        let route = opportunity.route_identity();
        let mut inner = self.inner.lock().unwrap();

        if let Some(&last) = inner.last_enqueued_at_ms.get(&route) {
            if now_ms.saturating_sub(last) < self.config.dedup_window_ms {
                debug!(cycle_length = route.len(), "duplicate opportunity within dedup window, skipped");
                return false;
            }
        }

        if inner.queue.len() >= self.config.capacity {
            warn!(capacity = self.config.capacity, "opportunity pipeline full, dropping newest");
            return false;
        }

        inner.last_enqueued_at_ms.insert(route, now_ms);
        inner.queue.push_back(opportunity);
        true
    }

    /// Dequeue the next live opportunity: skips (and drops) expired
    /// entries, then applies the USD floor if an oracle is supplied and
    /// can price the route. An unpriceable route (no oracle, or oracle
    /// returns `None`) is never filtered out on valuation grounds alone.
    pub fn dequeue(&self, now_ms: u64, oracle: Option<&dyn PriceOracle>) -> Option<ArbitrageOpportunity> {
        let mut inner = self.inner.lock().unwrap();

        while let Some(front) = inner.queue.pop_front() {
            if front.is_expired(now_ms) {
                debug!(cycle_length = front.cycle_length(), "opportunity expired before dequeue, dropping");
                continue;
            }

            if let Some(oracle) = oracle {
                let decimals = 18; // input token precision is carried by the caller's token registry
                if let Some(usd) = oracle.usd_value(front.input_token, front.expected_profit, decimals) {
                    if usd < self.config.min_profit_usd {
                        debug!(usd, floor = self.config.min_profit_usd, "opportunity below USD floor, dropping");
                        continue;
                    }
                }
            }

            return Some(front);
        }
        None
    }

    /// Timer-driven GC independent of dequeue activity: drops expired
    /// queue entries and stale dedup bookkeeping. Returns the number of
    /// queue entries removed.
    pub fn gc(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.queue.len();
        inner.queue.retain(|opp| !opp.is_expired(now_ms));
        let removed = before - inner.queue.len();

        inner
            .last_enqueued_at_ms
            .retain(|_, &mut last| now_ms.saturating_sub(last) < self.config.dedup_window_ms * 10);

        if removed > 0 {
            debug!(removed, "pipeline gc removed expired opportunities");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainId, TokenId};
    use alloy::primitives::{Address, U256};

    fn opportunity(pool_byte: u8, created_at_ms: u64, ttl_ms: u64) -> ArbitrageOpportunity {
        let token = TokenId::new(ChainId(137), Address::with_last_byte(1));
        ArbitrageOpportunity {
            chain: ChainId(137),
            input_token: token,
            input_amount: U256::from(1_000u64),
            legs: vec![crate::types::QuotedLeg {
                pool: crate::types::PoolId { chain: ChainId(137), address: Address::with_last_byte(pool_byte) },
                dex_family: crate::types::DexFamily::V2ConstantProduct,
                router: Address::ZERO,
                token_in: token,
                token_out: token,
                fee_bps: 30,
                amount_in: U256::from(1_000u64),
                amount_out: U256::from(1_100u64),
            }],
            expected_output: U256::from(1_100u64),
            expected_profit: U256::from(100u64),
            gas_estimate: 0,
            confidence: 0.9,
            created_at_ms,
            expires_at_ms: created_at_ms + ttl_ms,
        }
    }

    #[test]
    fn test_enqueue_and_dequeue_fifo_order() {
        let pipeline = OpportunityPipeline::new(PipelineConfig::default());
        assert!(pipeline.enqueue(opportunity(1, 0, 2_000), 0));
        assert!(pipeline.enqueue(opportunity(2, 0, 2_000), 100));

        let first = pipeline.dequeue(200, None).unwrap();
        assert_eq!(first.legs[0].pool.address, Address::with_last_byte(1));
    }

    #[test]
    fn test_duplicate_route_within_window_is_dropped() {
        let pipeline = OpportunityPipeline::new(PipelineConfig::default());
        assert!(pipeline.enqueue(opportunity(1, 0, 2_000), 0));
        assert!(!pipeline.enqueue(opportunity(1, 0, 2_000), 100));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_duplicate_route_outside_window_is_accepted() {
        let mut config = PipelineConfig::default();
        config.dedup_window_ms = 50;
        let pipeline = OpportunityPipeline::new(config);
        assert!(pipeline.enqueue(opportunity(1, 0, 2_000), 0));
        assert!(pipeline.enqueue(opportunity(1, 0, 2_000), 100));
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_expired_opportunity_dropped_on_dequeue() {
        let pipeline = OpportunityPipeline::new(PipelineConfig::default());
        pipeline.enqueue(opportunity(1, 0, 100), 0);
        assert!(pipeline.dequeue(5_000, None).is_none());
    }

    #[test]
    fn test_full_queue_drops_new_entry() {
        let mut config = PipelineConfig::default();
        config.capacity = 1;
        config.dedup_window_ms = 0;
        let pipeline = OpportunityPipeline::new(config);
        assert!(pipeline.enqueue(opportunity(1, 0, 2_000), 0));
        assert!(!pipeline.enqueue(opportunity(2, 0, 2_000), 1));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_gc_removes_expired_entries() {
        let pipeline = OpportunityPipeline::new(PipelineConfig::default());
        pipeline.enqueue(opportunity(1, 0, 100), 0);
        pipeline.enqueue(opportunity(2, 0, 5_000), 0);
        let removed = pipeline.gc(1_000);
        assert_eq!(removed, 1);
        assert_eq!(pipeline.len(), 1);
    }
}
