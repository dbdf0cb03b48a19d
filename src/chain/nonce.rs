//! Single-writer nonce counter, initialized from the chain and advanced
//! only on confirmed acceptance (§4.1, §5 ordering guarantee: "per chain,
//! transactions submit in nonce order").

use crate::error::{ArbError, ArbResult};
use alloy::primitives::Address;
use alloy::providers::Provider;
use tokio::sync::Mutex;

pub struct NonceManager {
    address: Address,
    next: Mutex<u64>,
}

impl NonceManager {
    pub async fn init<P: Provider>(provider: &P, address: Address) -> ArbResult<Self> {
        let current = provider
            .get_transaction_count(address)
            .await
            .map_err(|e| ArbError::Network {
                chain_id: 0,
                source: anyhow::anyhow!(e),
            })?;
        Ok(Self {
            address,
            next: Mutex::new(current),
        })
    }

    /// Peek the next nonce for submission. Does not advance the counter —
    /// a pre-broadcast failure (gas ceiling, network error, ...) must
    /// leave this same value free for the retry, not burn it. Callers
    /// advance explicitly via `advance` once the chain has actually
    /// accepted broadcast of a transaction using it.
    pub async fn reserve(&self) -> u64 {
        *self.next.lock().await
    }

    /// Advance the counter past `nonce`, called only after the chain has
    /// accepted broadcast of a transaction carrying it (§4.1: "advanced
    /// only on confirmed acceptance"). A no-op if `nonce` is no longer
    /// the counter's head — a concurrent `resync` already moved past it.
    pub async fn advance(&self, nonce: u64) {
        let mut guard = self.next.lock().await;
        if *guard == nonce {
            *guard = nonce + 1;
        }
    }

    /// Re-read the nonce from the chain after a nonce-conflict error
    /// (§7 error kind 6: "if nonce-conflict, resync nonce from chain and
    /// retry once").
    pub async fn resync<P: Provider>(&self, provider: &P) -> ArbResult<u64> {
        let current = provider
            .get_transaction_count(self.address)
            .await
            .map_err(|e| ArbError::Network {
                chain_id: 0,
                source: anyhow::anyhow!(e),
            })?;
        let mut guard = self.next.lock().await;
        *guard = current;
        Ok(current)
    }
}
