//! Core data model: tokens, pools, edges, opportunities, execution records.
//!
//! Author: AI-Generated
//! Created: 2026-01-28
//! Modified: 2026-07-28 — generalized from a fixed two-DEX pair model to a
//! multi-chain, N-leg cyclic model (directed multigraph over tokens).

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A token identified by (chain, address). Immutable post-discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub chain: ChainId,
    pub address: Address,
}

impl TokenId {
    pub fn new(chain: ChainId, address: Address) -> Self {
        Self { chain, address }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:?}", self.chain, self.address)
    }
}

/// Display metadata for a token. Decimals matter for pricing math; symbol
/// is display-only and never used in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub decimals: u8,
    pub symbol: String,
}

/// A pool identified by (chain, pool-address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId {
    pub chain: ChainId,
    pub address: Address,
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:?}", self.chain, self.address)
    }
}

/// Pricing family. Determines both the edge-weight formula (§4.4) and the
/// swap-step `data` encoding accepted by the external contract (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexFamily {
    V2ConstantProduct,
    V3Concentrated,
    StableCurve,
    RouteList,
}

impl DexFamily {
    /// `dexType` discriminant expected by `executeArbitrage`'s swap-step tuple.
    pub fn atomic_dex_type(&self) -> u8 {
        match self {
            DexFamily::V2ConstantProduct => 0,
            DexFamily::V3Concentrated => 1,
            DexFamily::StableCurve => 2,
            DexFamily::RouteList => 3,
        }
    }
}

impl fmt::Display for DexFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DexFamily::V2ConstantProduct => write!(f, "v2"),
            DexFamily::V3Concentrated => write!(f, "v3"),
            DexFamily::StableCurve => write!(f, "stable"),
            DexFamily::RouteList => write!(f, "route-list"),
        }
    }
}

/// A concrete DEX deployment on one chain (e.g. "uniswap_v3" on Base).
/// Unlike the fixed enum this is modeled on, deployments are data, not
/// code — a new chain or fork needs a config entry, not a new variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dex {
    pub name: String,
    pub family: DexFamily,
    pub router: Address,
    pub factory: Address,
    /// V3-family only: quoter for pre-flight `eth_call` quoting.
    pub quoter: Option<Address>,
}

/// The on-chain pricing inputs for a pool, tagged with the sequence number
/// they were observed at. `Sequence` packs (block_number, log_index) into
/// one monotone key so snapshot application can be gated by a single
/// comparison (spec invariant: strictly increasing per pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        // log_index rarely exceeds a few hundred per block; 20 bits is ample
        // headroom while leaving block_number the high 44 bits.
        Self((block_number << 20) | (log_index & 0xF_FFFF))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PoolSnapshot {
    V2 {
        reserve0: U256,
        reserve1: U256,
    },
    V3 {
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    },
}

impl PoolSnapshot {
    pub fn is_empty(&self) -> bool {
        match self {
            PoolSnapshot::V2 { reserve0, reserve1 } => reserve0.is_zero() || reserve1.is_zero(),
            PoolSnapshot::V3 { liquidity, .. } => *liquidity == 0,
        }
    }
}

/// A pool's full identity plus its current pricing snapshot. The State
/// Mirror is the sole writer of `snapshot`/`sequence`; the Pricing Graph
/// reads but never mutates a `Pool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub dex: Dex,
    pub token0: TokenId,
    pub token1: TokenId,
    pub fee_bps: u32,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    pub snapshot: PoolSnapshot,
    pub sequence: Sequence,
}

impl Pool {
    /// Fee sentinel for V2-family legs in `executeArbitrage`'s swap-step
    /// tuple: `type(uint24).max`. Signals "constant-product swap, ignore
    /// the fee parameter" to the contract, mirroring the encoding the
    /// v2-family `data` field never carries (spec §6: v2-family data is
    /// empty, the fee lives in the tier itself for v3).
    pub const V2_FEE_SENTINEL: u32 = 16_777_215;

    pub fn other_token(&self, token: TokenId) -> Option<TokenId> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    pub fn decimals_of(&self, token: TokenId) -> Option<u8> {
        if token == self.token0 {
            Some(self.token0_decimals)
        } else if token == self.token1 {
            Some(self.token1_decimals)
        } else {
            None
        }
    }
}

/// A directed, derived edge between two tokens through one pool. Never
/// stored canonically — recomputed whenever the backing pool's snapshot
/// changes (§3, §4.4).
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: TokenId,
    pub to: TokenId,
    pub pool: PoolId,
    pub dex_family: DexFamily,
    pub fee_bps: u32,
    pub router: Address,
    /// Reference reserves at edge-build time: (reserve_in, reserve_out)
    /// for v2-family, or (sqrt_price_x96, liquidity) reinterpreted by the
    /// calculator for v3-family. Carried so the executable quote does not
    /// need to re-read the pool during detection.
    pub reference_reserves: (U256, U256),
    pub weight: f64,
    pub sequence: Sequence,
}

/// One leg of an already-quoted arbitrage cycle, ready for ABI encoding
/// into the external contract's swap-step tuple
/// `(router, tokenIn, tokenOut, amountIn, data, dexType)`.
#[derive(Debug, Clone)]
pub struct QuotedLeg {
    pub pool: PoolId,
    pub dex_family: DexFamily,
    pub router: Address,
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub fee_bps: u32,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// A proposed arbitrage cycle: a non-empty ordered sequence of edges whose
/// first edge's source equals its last edge's destination.
#[derive(Debug, Clone)]
pub struct ArbitrageOpportunity {
    pub chain: ChainId,
    pub input_token: TokenId,
    pub input_amount: U256,
    pub legs: Vec<QuotedLeg>,
    pub expected_output: U256,
    pub expected_profit: U256,
    pub gas_estimate: u64,
    pub confidence: f64,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

impl ArbitrageOpportunity {
    pub fn cycle_length(&self) -> usize {
        self.legs.len()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }

    /// Edge-sequence identity used for pipeline dedup and detector-result
    /// union dedup: the ordered list of pools visited.
    pub fn route_identity(&self) -> Vec<PoolId> {
        self.legs.iter().map(|leg| leg.pool).collect()
    }

    pub fn profit_bps(&self) -> u64 {
        if self.input_amount.is_zero() {
            return 0;
        }
        let profit = self.expected_profit;
        ((profit * U256::from(10_000)) / self.input_amount).to::<u64>()
    }
}

/// Outcome of one executed opportunity. Append-only; retained in a
/// bounded ring (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub chain: ChainId,
    pub tx_hash: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub realized_profit_usd: Option<f64>,
    pub gas_used: Option<u64>,
    pub block_number: Option<u64>,
    pub submitted_at_ms: u64,
    pub confirmed_at_ms: Option<u64>,
}

/// Per-chain running total of realized losses within a 24h window.
/// Monotonically non-decreasing within the window; resets at rollover
/// from the first post-reset trade (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLossAccumulator {
    pub chain: ChainId,
    pub window_start_ms: u64,
    pub running_loss_usd: f64,
    pub limit_usd: f64,
    pub paused: bool,
}

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

impl DailyLossAccumulator {
    pub fn new(chain: ChainId, limit_usd: f64, now_ms: u64) -> Self {
        Self {
            chain,
            window_start_ms: now_ms,
            running_loss_usd: 0.0,
            limit_usd,
            paused: false,
        }
    }

    /// Roll the 24h window over if expired, resetting the running loss
    /// from this (the first post-reset) trade.
    fn maybe_roll_window(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.window_start_ms) >= DAY_MS {
            self.window_start_ms = now_ms;
            self.running_loss_usd = 0.0;
        }
    }

    /// Record a realized loss; returns true if the daily limit is now
    /// breached (caller is responsible for pausing the chain).
    pub fn record_loss(&mut self, loss_usd: f64, now_ms: u64) -> bool {
        self.maybe_roll_window(now_ms);
        self.running_loss_usd += loss_usd.max(0.0);
        if self.running_loss_usd >= self.limit_usd {
            self.paused = true;
        }
        self.paused
    }

    pub fn clear(&mut self, now_ms: u64) {
        self.window_start_ms = now_ms;
        self.running_loss_usd = 0.0;
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_fee_sentinel() {
        assert_eq!(Pool::V2_FEE_SENTINEL, (1u32 << 24) - 1);
    }

    #[test]
    fn test_sequence_orders_by_block_then_log_index() {
        let a = Sequence::new(100, 0);
        let b = Sequence::new(100, 5);
        let c = Sequence::new(101, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_dex_family_atomic_dex_type() {
        assert_eq!(DexFamily::V2ConstantProduct.atomic_dex_type(), 0);
        assert_eq!(DexFamily::V3Concentrated.atomic_dex_type(), 1);
        assert_eq!(DexFamily::StableCurve.atomic_dex_type(), 2);
        assert_eq!(DexFamily::RouteList.atomic_dex_type(), 3);
    }

    #[test]
    fn test_daily_loss_accumulator_breaches_at_limit() {
        let mut acc = DailyLossAccumulator::new(ChainId(137), 100.0, 0);
        assert!(!acc.record_loss(60.0, 1_000));
        assert!(acc.record_loss(41.0, 2_000));
        assert!(acc.paused);
    }

    #[test]
    fn test_daily_loss_accumulator_resets_on_window_rollover() {
        let mut acc = DailyLossAccumulator::new(ChainId(137), 100.0, 0);
        acc.record_loss(90.0, 1_000);
        assert!(!acc.paused);
        assert!(!acc.record_loss(5.0, DAY_MS + 1));
        assert_eq!(acc.running_loss_usd, 5.0);
    }

    #[test]
    fn test_opportunity_expiry() {
        let opp = ArbitrageOpportunity {
            chain: ChainId(8453),
            input_token: TokenId::new(ChainId(8453), Address::ZERO),
            input_amount: U256::from(1_000),
            legs: vec![],
            expected_output: U256::from(1_000),
            expected_profit: U256::ZERO,
            gas_estimate: 0,
            confidence: 0.0,
            created_at_ms: 0,
            expires_at_ms: 2_000,
        };
        assert!(!opp.is_expired(2_000));
        assert!(opp.is_expired(2_001));
    }
}
