//! Configuration management
//! Load settings from environment variables (optionally via a `.env`
//! file). Layered config files, hot-reload, and a generalized config
//! framework are explicitly out of scope (spec Non-goal); loading the
//! engine's own parameters from the environment is not.

use crate::types::{ChainId, Dex};
use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Per-chain RPC endpoints and wallet. `perChainEndpoints` in spec §6.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_http_url: String,
    pub rpc_ws_url: String,
    pub private_submit_url: Option<String>,
    /// Source token for the detector's Bellman-Ford search (typically
    /// wrapped-native), and the curated token set for pool discovery.
    pub source_token: Address,
    pub discovery_tokens: Vec<Address>,
    /// DEX deployments to query during pool discovery (§4.2), given as a
    /// JSON array matching `Dex`'s `Serialize`/`Deserialize` shape.
    pub dexes: Vec<Dex>,
    pub max_gas_price_gwei: u64,
    pub daily_loss_limit_usd: f64,
    /// Single-transaction realized-loss ceiling; breaching it is a hard
    /// stop, not an auto-pause (§4.7 step 5).
    pub per_tx_loss_limit_usd: f64,
    pub native_token_price_usd: f64,
    /// Stablecoin the price oracle anchors USD valuation on for this
    /// chain (§6 "external collaborator").
    pub stablecoin: Address,
    pub stablecoin_decimals: u8,
    pub native_decimals: u8,
}

/// Engine-wide configuration. Load-time except `paused`, which is
/// runtime-mutable via `control::ControlHandle` (spec §6).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chains: Vec<ChainConfig>,
    pub wallet_key: String,
    pub min_profit_usd: f64,
    pub max_slippage_bps: u32,
    pub simulate_before_execute: bool,
    pub dry_run: bool,
    pub cooldown_ms: u64,
    pub arb_executor_address: Address,
    /// Bounded-depth DFS cycle length cap (§4.5, default 3).
    pub detector_max_cycle_len: usize,
    /// Reserve floor below which an edge's thinner side counts as "thin"
    /// for confidence scoring (§4.5).
    pub liquidity_floor: alloy::primitives::U256,
    /// Opportunity validity window in ms (§4.6, default 2000 — see
    /// DESIGN.md Open Question #4 on not scaling this to block time).
    pub opportunity_ttl_ms: u64,
    /// Dedup window for equivalent pending opportunities (§4.6).
    pub dedup_window_ms: u64,
    pub route_cooldown_blocks: u64,
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{} not set", key))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).with_context(|| format!("invalid address: {}", s)))
        .collect()
}

impl EngineConfig {
    /// Load configuration from the environment. `ENABLED_CHAINS` is a
    /// comma-separated list of chain-ids; per-chain settings are read from
    /// `CHAIN_<id>_*` variables.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let enabled_chains = env_var("ENABLED_CHAINS")?;
        let mut chains = Vec::new();
        for id_str in enabled_chains.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let chain_id: u64 = id_str.parse().with_context(|| format!("invalid chain id: {}", id_str))?;
            chains.push(ChainConfig::from_env(chain_id)?);
        }
        if chains.is_empty() {
            bail!("ENABLED_CHAINS must list at least one chain id");
        }

        Ok(Self {
            chains,
            wallet_key: env_var("WALLET_KEY")?,
            min_profit_usd: env_var("MIN_PROFIT_USD")?.parse()?,
            max_slippage_bps: env_var_or("MAX_SLIPPAGE_BPS", "50").parse()?,
            simulate_before_execute: env_var_or("SIMULATE_BEFORE_EXECUTE", "true").parse()?,
            dry_run: env_var_or("DRY_RUN", "true").parse()?,
            cooldown_ms: env_var_or("COOLDOWN_MS", "0").parse()?,
            arb_executor_address: Address::from_str(&env_var("ARB_EXECUTOR_ADDRESS")?)?,
            detector_max_cycle_len: env_var_or("DETECTOR_MAX_CYCLE_LEN", "3").parse()?,
            liquidity_floor: alloy::primitives::U256::from(
                env_var_or("LIQUIDITY_FLOOR", "1000000000000000000").parse::<u128>()?,
            ),
            opportunity_ttl_ms: env_var_or("OPPORTUNITY_TTL_MS", "2000").parse()?,
            dedup_window_ms: env_var_or("DEDUP_WINDOW_MS", "500").parse()?,
            route_cooldown_blocks: env_var_or("ROUTE_COOLDOWN_BLOCKS", "10").parse()?,
        })
    }

    pub fn chain(&self, id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == id)
    }
}

impl ChainConfig {
    fn from_env(chain_id: u64) -> Result<Self> {
        let prefix = format!("CHAIN_{}", chain_id);
        let get = |suffix: &str| env_var(&format!("{}_{}", prefix, suffix));
        let get_or = |suffix: &str, default: &str| env_var_or(&format!("{}_{}", prefix, suffix), default);

        Ok(Self {
            chain_id: ChainId(chain_id),
            name: get("NAME")?,
            rpc_http_url: get("RPC_HTTP_URL")?,
            rpc_ws_url: get("RPC_WS_URL")?,
            private_submit_url: std::env::var(format!("{}_PRIVATE_SUBMIT_URL", prefix)).ok(),
            source_token: Address::from_str(&get("SOURCE_TOKEN")?)?,
            discovery_tokens: parse_address_list(&get("DISCOVERY_TOKENS")?)?,
            dexes: serde_json::from_str(&get("DEXES_JSON")?)
                .with_context(|| format!("invalid {}_DEXES_JSON", prefix))?,
            max_gas_price_gwei: get_or("MAX_GAS_PRICE_GWEI", "200").parse()?,
            daily_loss_limit_usd: get_or("DAILY_LOSS_LIMIT_USD", "100").parse()?,
            per_tx_loss_limit_usd: get_or("PER_TX_LOSS_LIMIT_USD", "25").parse()?,
            native_token_price_usd: get_or("NATIVE_TOKEN_PRICE_USD", "1.0").parse()?,
            stablecoin: Address::from_str(&get("STABLECOIN")?)?,
            stablecoin_decimals: get_or("STABLECOIN_DECIMALS", "6").parse()?,
            native_decimals: get_or("NATIVE_DECIMALS", "18").parse()?,
        })
    }

    pub fn private_mempool_enabled(&self) -> bool {
        self.private_submit_url.is_some()
    }
}

/// Canonical v3-family fee tiers queried during discovery (§4.2).
pub const V3_FEE_TIERS_BPS: [u32; 4] = [1, 5, 30, 100];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_list_skips_blank_entries() {
        let addrs = parse_address_list(
            "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002,",
        )
        .unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn test_v3_fee_tiers_match_spec() {
        assert_eq!(V3_FEE_TIERS_BPS, [1, 5, 30, 100]);
    }
}
