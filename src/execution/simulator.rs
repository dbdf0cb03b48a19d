//! Pre-flight simulator — an `eth_call` against the real execution
//! contract plus a gas estimate, gating submission before a transaction
//! ever hits the network (§4.7 step 1).
//!
//! Grounded on `arbitrage::multicall_quoter::MulticallQuoter`'s stated
//! philosophy ("pre-screening only, the executor re-verifies") but
//! simulates the actual `executeArbitrage` entry point via `.call()`
//! instead of re-deriving Quoter math for each leg separately — alloy's
//! contract bindings make the real call as cheap as the batch quote would
//! have been, and it exercises the exact calldata the executor later
//! submits.

use crate::chain::ChainClient;
use crate::contracts::{ArbitrageParams, IArbitrageExecutor, SwapStep};
use crate::oracle::PriceOracle;
use crate::types::{ArbitrageOpportunity, DexFamily};
use alloy::primitives::{Address, Bytes, U256};
use tracing::{debug, warn};

/// Disqualify if the estimated gas cost exceeds this fraction of expected
/// profit (§4.7: "exceeds expected profit by more than 50%").
const MAX_GAS_TO_PROFIT_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub viable: bool,
    pub reason: Option<String>,
    pub estimated_gas: u64,
}

pub struct Simulator;

impl Simulator {
    pub async fn simulate(
        client: &ChainClient,
        executor_contract: Address,
        opportunity: &ArbitrageOpportunity,
        gas_price_wei: u128,
        oracle: Option<&dyn PriceOracle>,
        native_decimals: u8,
    ) -> SimulationResult {
        let params = Self::build_params(opportunity);
        let contract = IArbitrageExecutor::new(executor_contract, client.http().clone());
        let call = contract.executeArbitrage(params);

        if let Err(e) = call.call().await {
            return SimulationResult {
                viable: false,
                reason: Some(format!("simulated call reverted: {}", e)),
                estimated_gas: 0,
            };
        }

        let estimated_gas = match call.estimate_gas().await {
            Ok(gas) => gas,
            Err(e) => {
                warn!(error = %e, "gas estimation failed after a successful simulated call");
                return SimulationResult {
                    viable: false,
                    reason: Some(format!("gas estimation failed: {}", e)),
                    estimated_gas: 0,
                };
            }
        };

        if let Some(oracle) = oracle {
            let gas_cost_native = U256::from(gas_price_wei) * U256::from(estimated_gas);
            let gas_cost_usd = oracle.usd_value(opportunity.input_token, gas_cost_native, native_decimals);
            let profit_usd = oracle.usd_value(opportunity.input_token, opportunity.expected_profit, native_decimals);

            if let (Some(gas_usd), Some(profit_usd)) = (gas_cost_usd, profit_usd) {
                if profit_usd > 0.0 && gas_usd / profit_usd > MAX_GAS_TO_PROFIT_RATIO {
                    debug!(gas_usd, profit_usd, "gas cost exceeds profit ratio, disqualifying");
                    return SimulationResult {
                        viable: false,
                        reason: Some("estimated gas cost exceeds profit threshold".to_string()),
                        estimated_gas,
                    };
                }
            }
        }

        SimulationResult {
            viable: true,
            reason: None,
            estimated_gas,
        }
    }

    /// Translate a quoted cycle into the contract's swap-step tuple,
    /// applying §6's per-family `data` encoding: empty for v2-family, the
    /// ABI-encoded fee tier for v3-family, and a placeholder encoding for
    /// the stable/route-list families the registry does not yet discover.
    pub fn build_params(opportunity: &ArbitrageOpportunity) -> ArbitrageParams {
        let swaps = opportunity
            .legs
            .iter()
            .map(|leg| SwapStep {
                router: leg.router,
                tokenIn: leg.token_in.address,
                tokenOut: leg.token_out.address,
                amountIn: leg.amount_in,
                data: Self::encode_swap_data(leg.dex_family, leg.fee_bps),
                dexType: leg.dex_family.atomic_dex_type(),
            })
            .collect();

        ArbitrageParams {
            flashToken: opportunity.input_token.address,
            flashAmount: opportunity.input_amount,
            swaps,
            minProfit: opportunity.expected_profit,
        }
    }

    fn encode_swap_data(family: DexFamily, fee_bps: u32) -> Bytes {
        match family {
            DexFamily::V2ConstantProduct => Bytes::new(),
            DexFamily::V3Concentrated => {
                let fee_tier = U256::from(fee_bps * 100);
                Bytes::from(fee_tier.to_be_bytes::<32>())
            }
            // Curve index pair and route-list flag are not yet surfaced by
            // pool discovery; these families encode a zeroed placeholder
            // until a discovery source for them exists.
            DexFamily::StableCurve => {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
                buf.extend_from_slice(&U256::from(1u8).to_be_bytes::<32>());
                Bytes::from(buf)
            }
            DexFamily::RouteList => Bytes::from(U256::ZERO.to_be_bytes::<32>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainId, PoolId, QuotedLeg, TokenId};

    fn token(n: u8) -> TokenId {
        TokenId::new(ChainId(137), Address::with_last_byte(n))
    }

    fn sample_opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            chain: ChainId(137),
            input_token: token(1),
            input_amount: U256::from(1_000_000u64),
            legs: vec![QuotedLeg {
                pool: PoolId { chain: ChainId(137), address: Address::with_last_byte(9) },
                dex_family: DexFamily::V3Concentrated,
                router: Address::with_last_byte(2),
                token_in: token(1),
                token_out: token(2),
                fee_bps: 5,
                amount_in: U256::from(1_000_000u64),
                amount_out: U256::from(1_050_000u64),
            }],
            expected_output: U256::from(1_050_000u64),
            expected_profit: U256::from(50_000u64),
            gas_estimate: 0,
            confidence: 0.8,
            created_at_ms: 0,
            expires_at_ms: 2_000,
        }
    }

    #[test]
    fn test_v2_data_is_empty() {
        let data = Simulator::encode_swap_data(DexFamily::V2ConstantProduct, 30);
        assert!(data.is_empty());
    }

    #[test]
    fn test_v3_data_encodes_fee_in_hundredths_of_bip() {
        let data = Simulator::encode_swap_data(DexFamily::V3Concentrated, 5);
        let decoded = U256::from_be_slice(&data);
        assert_eq!(decoded, U256::from(500u32)); // 5 bps * 100
    }

    #[test]
    fn test_build_params_maps_legs_to_swap_steps() {
        let opportunity = sample_opportunity();
        let params = Simulator::build_params(&opportunity);
        assert_eq!(params.swaps.len(), 1);
        assert_eq!(params.flashToken, token(1).address);
        assert_eq!(params.flashAmount, U256::from(1_000_000u64));
        assert_eq!(params.swaps[0].dexType, DexFamily::V3Concentrated.atomic_dex_type());
    }
}
