//! Pool Registry & Discovery (§4.2).
//!
//! Grounded on `pool::v2_syncer`/`pool::v3_syncer` (factory `getPair`/
//! `getPool` queries, per-token `decimals()` lookups), generalized from a
//! hardcoded Uniswap/Sushiswap pair to an arbitrary configured set of
//! `(chain, dex)` entries and all four canonical v3 fee tiers.

use crate::chain::{ChainClient, PoolEventKind};
use crate::config::V3_FEE_TIERS_BPS;
use crate::contracts::{IERC20, IV2Factory, IV2Pool, IV3Factory, IV3Pool};
use crate::types::{Dex, DexFamily, Pool, PoolId, PoolSnapshot, Sequence, TokenId};
use alloy::primitives::Address;
use itertools::Itertools;
use tracing::{debug, info, warn};

pub struct PoolRegistry;

impl PoolRegistry {
    /// Enumerate pools for every unordered pair drawn from
    /// `discovery_tokens`, across every configured `dex`. Non-existent
    /// pools are silently skipped (§4.2).
    pub async fn discover(client: &ChainClient, dexes: &[Dex], discovery_tokens: &[Address]) -> Vec<Pool> {
        let mut pools = Vec::new();

        for dex in dexes {
            for (a, b) in discovery_tokens.iter().copied().tuple_combinations() {
                let discovered = match dex.family {
                    DexFamily::V2ConstantProduct => Self::discover_v2(client, dex, a, b).await,
                    DexFamily::V3Concentrated => Self::discover_v3(client, dex, a, b).await,
                    DexFamily::StableCurve | DexFamily::RouteList => Vec::new(),
                };
                pools.extend(discovered);
            }
        }

        info!(count = pools.len(), "pool discovery complete");
        pools
    }

    async fn discover_v2(client: &ChainClient, dex: &Dex, a: Address, b: Address) -> Vec<Pool> {
        let factory = IV2Factory::new(dex.factory, client.http().clone());
        let pair_address = match factory.getPair(a, b).call().await {
            Ok(addr) if addr != Address::ZERO => addr,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(dex = %dex.name, %a, %b, error = %e, "getPair call failed, skipping");
                return Vec::new();
            }
        };

        match Self::fetch_v2_pool(client, dex, pair_address).await {
            Ok(pool) => vec![pool],
            Err(e) => {
                warn!(%pair_address, error = %e, "failed to fetch v2 pool state, skipping");
                Vec::new()
            }
        }
    }

    async fn fetch_v2_pool(client: &ChainClient, dex: &Dex, pair_address: Address) -> anyhow::Result<Pool> {
        let pool = IV2Pool::new(pair_address, client.http().clone());
        let token0 = pool.token0().call().await?;
        let token1 = pool.token1().call().await?;
        let token0_decimals = IERC20::new(token0, client.http().clone()).decimals().call().await?;
        let token1_decimals = IERC20::new(token1, client.http().clone()).decimals().call().await?;
        let reserves = pool.getReserves().call().await?;
        let block_number = client.block_number().await.unwrap_or(0);

        debug!(%pair_address, dex = %dex.name, "v2 pool discovered");

        Ok(Pool {
            id: PoolId { chain: client.chain_id, address: pair_address },
            dex: dex.clone(),
            token0: TokenId::new(client.chain_id, token0),
            token1: TokenId::new(client.chain_id, token1),
            fee_bps: 30,
            token0_decimals,
            token1_decimals,
            snapshot: PoolSnapshot::V2 {
                reserve0: alloy::primitives::U256::from(reserves.reserve0),
                reserve1: alloy::primitives::U256::from(reserves.reserve1),
            },
            sequence: Sequence::new(block_number, 0),
        })
    }

    async fn discover_v3(client: &ChainClient, dex: &Dex, a: Address, b: Address) -> Vec<Pool> {
        let factory = IV3Factory::new(dex.factory, client.http().clone());
        let mut found = Vec::new();

        for fee_bps in V3_FEE_TIERS_BPS {
            let fee_tier = fee_bps * 100; // bps -> hundredths-of-a-bip on-chain fee unit
            let pool_address = match factory.getPool(a, b, fee_tier).call().await {
                Ok(addr) if addr != Address::ZERO => addr,
                Ok(_) => continue,
                Err(e) => {
                    warn!(dex = %dex.name, %a, %b, fee_tier, error = %e, "getPool call failed, skipping");
                    continue;
                }
            };

            match Self::fetch_v3_pool(client, dex, pool_address, fee_bps).await {
                Ok(pool) => found.push(pool),
                Err(e) => warn!(%pool_address, error = %e, "failed to fetch v3 pool state, skipping"),
            }
        }

        found
    }

    async fn fetch_v3_pool(client: &ChainClient, dex: &Dex, pool_address: Address, fee_bps: u32) -> anyhow::Result<Pool> {
        let pool = IV3Pool::new(pool_address, client.http().clone());
        let token0 = pool.token0().call().await?;
        let token1 = pool.token1().call().await?;
        let token0_decimals = IERC20::new(token0, client.http().clone()).decimals().call().await?;
        let token1_decimals = IERC20::new(token1, client.http().clone()).decimals().call().await?;
        let slot0 = pool.slot0().call().await?;
        let liquidity = pool.liquidity().call().await?;
        let block_number = client.block_number().await.unwrap_or(0);

        debug!(%pool_address, dex = %dex.name, fee_bps, "v3 pool discovered");

        Ok(Pool {
            id: PoolId { chain: client.chain_id, address: pool_address },
            dex: dex.clone(),
            token0: TokenId::new(client.chain_id, token0),
            token1: TokenId::new(client.chain_id, token1),
            fee_bps,
            token0_decimals,
            token1_decimals,
            snapshot: PoolSnapshot::V3 {
                sqrt_price_x96: alloy::primitives::U256::from(slot0.sqrtPriceX96),
                liquidity,
                tick: slot0.tick.as_i32(),
            },
            sequence: Sequence::new(block_number, 0),
        })
    }

    pub fn event_kind(dex_family: DexFamily) -> PoolEventKind {
        match dex_family {
            DexFamily::V2ConstantProduct | DexFamily::StableCurve | DexFamily::RouteList => PoolEventKind::V2Sync,
            DexFamily::V3Concentrated => PoolEventKind::V3Swap,
        }
    }
}
