//! Atomic single-call executor — submits the quoted cycle to the external
//! `executeArbitrage` entry point, confirms, and records the outcome
//! (§4.7 steps 2-4, §4.8).
//!
//! Grounded on `arbitrage::executor::TradeExecutor`'s shape (dry-run flag
//! defaulting safe, gas-ceiling pre-check, structured result, nonce and
//! retry handling) but collapsed from two sequential router swaps with
//! leg risk into one atomic flashloan-backed contract call, per the
//! external collaborator contract (§4.8).

use crate::chain::{ChainClient, NonceManager};
use crate::contracts::IArbitrageExecutor;
use crate::error::ArbError;
use crate::execution::simulator::Simulator;
use crate::oracle::PriceOracle;
use crate::types::{ArbitrageOpportunity, DailyLossAccumulator, ExecutionRecord};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

const DRY_RUN_TX_HASH: &str = "0xdryrun000000000000000000000000000000000000000000000000000000";

pub struct ExecutorConfig {
    pub max_slippage_bps: u32,
    pub dry_run: bool,
    pub confirmations: u64,
    pub max_gas_price_gwei: u64,
    /// Single-transaction realized-loss ceiling; breaching it fails hard
    /// rather than auto-pausing (§4.7 step 5).
    pub per_tx_loss_limit_usd: f64,
}

/// One chain's submission path. At-most-one in-flight transaction is
/// enforced by serializing `execute` through `in_flight` (§5).
pub struct Executor {
    client: std::sync::Arc<ChainClient>,
    nonce: NonceManager,
    contract_address: Address,
    config: ExecutorConfig,
    in_flight: tokio::sync::Mutex<()>,
}

impl Executor {
    pub fn new(
        client: std::sync::Arc<ChainClient>,
        nonce: NonceManager,
        contract_address: Address,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            nonce,
            contract_address,
            config,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs one opportunity through submission and confirmation. Returns
    /// `Err` only when the per-transaction loss ceiling is breached on a
    /// reverted trade (§4.7 step 5's hard-fail path) — every other
    /// failure mode (submission, confirmation, revert below the ceiling)
    /// is reported as a failed `ExecutionRecord`, not an error.
    pub async fn execute(
        &self,
        opportunity: &ArbitrageOpportunity,
        loss_accumulator: &Mutex<DailyLossAccumulator>,
        oracle: Option<&dyn PriceOracle>,
        native_decimals: u8,
    ) -> Result<ExecutionRecord, ArbError> {
        let _guard = self.in_flight.lock().await;
        let submitted_at_ms = now_ms();

        if self.config.dry_run {
            info!(cycle_length = opportunity.cycle_length(), "dry run: synthesizing success without submission");
            return Ok(ExecutionRecord {
                chain: opportunity.chain,
                tx_hash: Some(DRY_RUN_TX_HASH.to_string()),
                success: true,
                error_kind: None,
                realized_profit_usd: oracle.and_then(|o| o.usd_value(opportunity.input_token, opportunity.expected_profit, native_decimals)),
                gas_used: None,
                block_number: None,
                submitted_at_ms,
                confirmed_at_ms: Some(submitted_at_ms),
            });
        }

        let mut params = Simulator::build_params(opportunity);
        let slippage_factor = U256::from(10_000u32 - self.config.max_slippage_bps.min(10_000));
        params.minProfit = (opportunity.expected_profit * slippage_factor) / U256::from(10_000u32);

        match self.submit_with_retry(params).await {
            Ok(tx_hash) => self.confirm_and_record(opportunity, tx_hash, loss_accumulator, oracle, native_decimals, submitted_at_ms).await,
            Err(e) => {
                error!(error = %e, "submission failed before broadcast");
                Ok(ExecutionRecord {
                    chain: opportunity.chain,
                    tx_hash: None,
                    success: false,
                    error_kind: Some(format!("{:?}", e.classify())),
                    realized_profit_usd: None,
                    gas_used: None,
                    block_number: None,
                    submitted_at_ms,
                    confirmed_at_ms: None,
                })
            }
        }
    }

    /// Reserve a nonce, build the calldata, submit. The nonce counter only
    /// advances once broadcast is actually accepted — any pre-broadcast
    /// failure (gas ceiling, network error, nonce conflict, ...) leaves it
    /// untouched so the same nonce is reused on the next attempt; on a
    /// nonce conflict specifically, resync from chain and retry once
    /// (§7 error kind 6).
    async fn submit_with_retry(&self, params: crate::contracts::ArbitrageParams) -> Result<alloy::primitives::TxHash, ArbError> {
        let nonce = self.nonce.reserve().await;
        let tx = self.build_transaction(params.clone(), nonce);

        match self.client.submit(tx, self.config.max_gas_price_gwei).await {
            Ok(tx_hash) => {
                self.nonce.advance(nonce).await;
                Ok(tx_hash)
            }
            Err(ArbError::NonceConflict { .. }) => {
                warn!("nonce conflict, resyncing and retrying once");
                let resynced = self.nonce.resync(self.client.http()).await?;
                let retry_tx = self.build_transaction(params, resynced);
                match self.client.submit(retry_tx, self.config.max_gas_price_gwei).await {
                    Ok(tx_hash) => {
                        self.nonce.advance(resynced).await;
                        Ok(tx_hash)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn build_transaction(&self, params: crate::contracts::ArbitrageParams, nonce: u64) -> TransactionRequest {
        let contract = IArbitrageExecutor::new(self.contract_address, self.client.http().clone());
        contract
            .executeArbitrage(params)
            .into_transaction_request()
            .with_nonce(nonce)
    }

    async fn confirm_and_record(
        &self,
        opportunity: &ArbitrageOpportunity,
        tx_hash: alloy::primitives::TxHash,
        loss_accumulator: &Mutex<DailyLossAccumulator>,
        oracle: Option<&dyn PriceOracle>,
        native_decimals: u8,
        submitted_at_ms: u64,
    ) -> Result<ExecutionRecord, ArbError> {
        match self.client.wait_for_receipt(tx_hash, self.config.confirmations).await {
            Ok((true, block_number, gas_used)) => {
                let realized_profit_usd = oracle.and_then(|o| o.usd_value(opportunity.input_token, opportunity.expected_profit, native_decimals));
                info!(%tx_hash, ?realized_profit_usd, "arbitrage executed successfully");
                Ok(ExecutionRecord {
                    chain: opportunity.chain,
                    tx_hash: Some(tx_hash.to_string()),
                    success: true,
                    error_kind: None,
                    realized_profit_usd,
                    gas_used,
                    block_number,
                    submitted_at_ms,
                    confirmed_at_ms: Some(now_ms()),
                })
            }
            Ok((false, block_number, gas_used)) => {
                warn!(%tx_hash, "transaction reverted on-chain");
                self.record_loss(opportunity, gas_used, loss_accumulator, oracle, native_decimals)?;
                Ok(ExecutionRecord {
                    chain: opportunity.chain,
                    tx_hash: Some(tx_hash.to_string()),
                    success: false,
                    error_kind: Some("PostSubmitRevert".to_string()),
                    realized_profit_usd: None,
                    gas_used,
                    block_number,
                    submitted_at_ms,
                    confirmed_at_ms: Some(now_ms()),
                })
            }
            Err(e) => {
                error!(%tx_hash, error = %e, "failed to confirm transaction");
                Ok(ExecutionRecord {
                    chain: opportunity.chain,
                    tx_hash: Some(tx_hash.to_string()),
                    success: false,
                    error_kind: Some(format!("{:?}", e.classify())),
                    realized_profit_usd: None,
                    gas_used: None,
                    block_number: None,
                    submitted_at_ms,
                    confirmed_at_ms: None,
                })
            }
        }
    }

    /// A reverted submission still burns gas; charge that against the
    /// per-transaction ceiling (hard-fail if breached) and the daily loss
    /// limit (§3 `DailyLossAccumulator`, §4.7 step 5).
    fn record_loss(
        &self,
        opportunity: &ArbitrageOpportunity,
        gas_used: Option<u64>,
        loss_accumulator: &Mutex<DailyLossAccumulator>,
        oracle: Option<&dyn PriceOracle>,
        native_decimals: u8,
    ) -> Result<(), ArbError> {
        let Some(gas_used) = gas_used else { return Ok(()) };
        let Some(oracle) = oracle else { return Ok(()) };
        let gas_cost_native = U256::from(gas_used) * U256::from(self.config.max_gas_price_gwei) * U256::from(1_000_000_000u64);
        let Some(loss_usd) = oracle.usd_value(opportunity.input_token, gas_cost_native, native_decimals) else { return Ok(()) };

        if loss_usd >= self.config.per_tx_loss_limit_usd {
            error!(chain = opportunity.chain.0, loss_usd, limit = self.config.per_tx_loss_limit_usd, "per-transaction loss ceiling breached, failing hard");
            return Err(ArbError::PerTxLossLimitBreached {
                chain_id: opportunity.chain.0,
                loss_usd,
                limit_usd: self.config.per_tx_loss_limit_usd,
            });
        }

        let now = now_ms();
        let mut acc = loss_accumulator.lock().unwrap();
        if acc.record_loss(loss_usd, now) {
            warn!(chain = opportunity.chain.0, "daily loss limit breached, chain should pause");
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;

    #[test]
    fn test_now_ms_is_monotonic_enough_for_ordering() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_slippage_adjusted_min_profit_shrinks_with_higher_slippage_bps() {
        let expected_profit = U256::from(1_000_000u64);
        let low_slippage = (expected_profit * U256::from(9_990u32)) / U256::from(10_000u32);
        let high_slippage = (expected_profit * U256::from(9_500u32)) / U256::from(10_000u32);
        assert!(low_slippage > high_slippage);
        let _ = ChainId(137);
    }
}
