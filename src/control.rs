//! Operator control surface — pause/resume/status/query API with no bound
//! network listener (spec §6; see DESIGN.md Open Question #1).
//!
//! Grounded on the teacher's `RouteCooldown`/`DailyLossAccumulator`-style
//! shared mutable state, collected here into one handle an embedding
//! binary can clone and query. Any HTTP front end is the embedder's
//! concern, not this crate's.

use crate::pool::StateMirror;
use crate::types::{ChainId, ExecutionRecord, Pool};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bound on the in-memory trade history ring (spec §3: "append-only,
/// retained in a bounded ring").
const RECENT_TRADES_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub chain: ChainId,
    pub paused: bool,
    pub pending_opportunities: usize,
    pub pools_tracked: usize,
    pub active_cooldowns: usize,
}

struct ChainState {
    paused: bool,
    trades: VecDeque<ExecutionRecord>,
    mirror: StateMirror,
}

/// Shared, cloneable handle into one running engine's per-chain state.
/// Every chain registers itself via `register_chain` at startup; all
/// other methods are no-ops on an unregistered chain id.
#[derive(Clone)]
pub struct ControlHandle {
    chains: Arc<RwLock<HashMap<ChainId, ChainState>>>,
    pipeline_lens: Arc<RwLock<HashMap<ChainId, usize>>>,
    cooldown_counts: Arc<RwLock<HashMap<ChainId, usize>>>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self {
            chains: Arc::new(RwLock::new(HashMap::new())),
            pipeline_lens: Arc::new(RwLock::new(HashMap::new())),
            cooldown_counts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register_chain(&self, chain: ChainId, mirror: StateMirror) {
        self.chains.write().await.insert(
            chain,
            ChainState {
                paused: false,
                trades: VecDeque::with_capacity(RECENT_TRADES_CAPACITY),
                mirror,
            },
        );
    }

    pub async fn pause(&self, chain: ChainId) {
        if let Some(state) = self.chains.write().await.get_mut(&chain) {
            state.paused = true;
        }
    }

    pub async fn resume(&self, chain: ChainId) {
        if let Some(state) = self.chains.write().await.get_mut(&chain) {
            state.paused = false;
        }
    }

    pub async fn is_paused(&self, chain: ChainId) -> bool {
        self.chains
            .read()
            .await
            .get(&chain)
            .map(|s| s.paused)
            .unwrap_or(false)
    }

    /// Record an execution outcome, trimming the ring to capacity.
    pub async fn record_trade(&self, chain: ChainId, record: ExecutionRecord) {
        if let Some(state) = self.chains.write().await.get_mut(&chain) {
            if state.trades.len() >= RECENT_TRADES_CAPACITY {
                state.trades.pop_front();
            }
            state.trades.push_back(record);
        }
    }

    /// Update the cached pipeline-depth gauge (pushed by the pipeline's
    /// owning task rather than polled, since the pipeline itself is not
    /// reachable from here without a cross-module dependency cycle).
    pub async fn set_pipeline_len(&self, chain: ChainId, len: usize) {
        self.pipeline_lens.write().await.insert(chain, len);
    }

    pub async fn set_cooldown_count(&self, chain: ChainId, count: usize) {
        self.cooldown_counts.write().await.insert(chain, count);
    }

    pub async fn recent_trades(&self, chain: ChainId) -> Vec<ExecutionRecord> {
        self.chains
            .read()
            .await
            .get(&chain)
            .map(|s| s.trades.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn queue_snapshot(&self, chain: ChainId) -> usize {
        self.pipeline_lens.read().await.get(&chain).copied().unwrap_or(0)
    }

    pub async fn pool_snapshot(&self, chain: ChainId) -> Vec<Pool> {
        self.chains
            .read()
            .await
            .get(&chain)
            .map(|s| s.mirror.all())
            .unwrap_or_default()
    }

    pub async fn status(&self, chain: ChainId) -> Option<ChainStatus> {
        let chains = self.chains.read().await;
        let state = chains.get(&chain)?;
        Some(ChainStatus {
            chain,
            paused: state.paused,
            pending_opportunities: self.pipeline_lens.read().await.get(&chain).copied().unwrap_or(0),
            pools_tracked: state.mirror.len(),
            active_cooldowns: self.cooldown_counts.read().await.get(&chain).copied().unwrap_or(0),
        })
    }

    pub async fn all_statuses(&self) -> Vec<ChainStatus> {
        let chain_ids: Vec<ChainId> = self.chains.read().await.keys().copied().collect();
        let mut out = Vec::with_capacity(chain_ids.len());
        for chain in chain_ids {
            if let Some(status) = self.status(chain).await {
                out.push(status);
            }
        }
        out
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;

    fn record(success: bool) -> ExecutionRecord {
        ExecutionRecord {
            chain: ChainId(137),
            tx_hash: None,
            success,
            error_kind: None,
            realized_profit_usd: None,
            gas_used: None,
            block_number: None,
            submitted_at_ms: 0,
            confirmed_at_ms: None,
        }
    }

    #[tokio::test]
    async fn test_pause_resume_roundtrip() {
        let handle = ControlHandle::new();
        let chain = ChainId(137);
        handle.register_chain(chain, StateMirror::new()).await;

        assert!(!handle.is_paused(chain).await);
        handle.pause(chain).await;
        assert!(handle.is_paused(chain).await);
        handle.resume(chain).await;
        assert!(!handle.is_paused(chain).await);
    }

    #[tokio::test]
    async fn test_unregistered_chain_reports_not_paused() {
        let handle = ControlHandle::new();
        assert!(!handle.is_paused(ChainId(999)).await);
        assert!(handle.status(ChainId(999)).await.is_none());
    }

    #[tokio::test]
    async fn test_recent_trades_ring_bounds_at_capacity() {
        let handle = ControlHandle::new();
        let chain = ChainId(137);
        handle.register_chain(chain, StateMirror::new()).await;

        for _ in 0..(RECENT_TRADES_CAPACITY + 10) {
            handle.record_trade(chain, record(true)).await;
        }

        assert_eq!(handle.recent_trades(chain).await.len(), RECENT_TRADES_CAPACITY);
    }

    #[tokio::test]
    async fn test_status_reflects_pipeline_len_and_cooldowns() {
        let handle = ControlHandle::new();
        let chain = ChainId(137);
        handle.register_chain(chain, StateMirror::new()).await;
        handle.set_pipeline_len(chain, 7).await;
        handle.set_cooldown_count(chain, 2).await;

        let status = handle.status(chain).await.unwrap();
        assert_eq!(status.pending_opportunities, 7);
        assert_eq!(status.active_cooldowns, 2);
        assert!(!status.paused);
    }
}
