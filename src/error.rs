//! Error taxonomy for the arbitrage engine.
//!
//! Library code returns `Result<T, ArbError>` so callers can match on a
//! specific failure kind (gas too high, nonce conflict, reverted, ...)
//! instead of pattern-matching error strings. Binaries still use
//! `anyhow::Result` at the top level.

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbError {
    #[error("transient network error on chain {chain_id}: {source}")]
    Network {
        chain_id: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("stale snapshot for pool {pool:?}: observed sequence {observed} <= current {current}")]
    StaleSnapshot {
        pool: Address,
        observed: u64,
        current: u64,
    },

    #[error("opportunity expired: created at {created_at}, now {now}")]
    OpportunityExpired { created_at: u64, now: u64 },

    #[error("simulation reverted: {reason}")]
    SimulationReverted { reason: String },

    #[error("gas price {gas_price_gwei} gwei exceeds ceiling {ceiling_gwei} gwei")]
    GasCeilingExceeded {
        gas_price_gwei: u64,
        ceiling_gwei: u64,
    },

    #[error("submission failed: {reason}")]
    SubmissionFailed { reason: String },

    #[error("nonce conflict: expected {expected}, node reports {actual}")]
    NonceConflict { expected: u64, actual: u64 },

    #[error("transaction {tx_hash} reverted on-chain")]
    PostSubmitRevert { tx_hash: String },

    #[error("daily loss limit breached on chain {chain_id}: {running_loss_usd:.2} >= {limit_usd:.2}")]
    DailyLossLimitBreached {
        chain_id: u64,
        running_loss_usd: f64,
        limit_usd: f64,
    },

    #[error("per-transaction loss ceiling breached on chain {chain_id}: {loss_usd:.2} >= {limit_usd:.2}")]
    PerTxLossLimitBreached {
        chain_id: u64,
        loss_usd: f64,
        limit_usd: f64,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ArbError {
    /// Classification used by the executor's retry/escalation policy.
    /// Mirrors spec.md §4.1's required {gas-too-high, nonce-conflict,
    /// reverted, network} submission-error categories.
    pub fn classify(&self) -> SubmissionErrorKind {
        match self {
            ArbError::GasCeilingExceeded { .. } => SubmissionErrorKind::GasTooHigh,
            ArbError::NonceConflict { .. } => SubmissionErrorKind::NonceConflict,
            ArbError::PostSubmitRevert { .. } | ArbError::SimulationReverted { .. } => {
                SubmissionErrorKind::Reverted
            }
            ArbError::Network { .. } => SubmissionErrorKind::Network,
            _ => SubmissionErrorKind::Other,
        }
    }

    /// True when the failure is local/recoverable and the same opportunity
    /// can be retried without operator intervention.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            ArbError::Network { .. }
                | ArbError::StaleSnapshot { .. }
                | ArbError::OpportunityExpired { .. }
                | ArbError::SimulationReverted { .. }
                | ArbError::GasCeilingExceeded { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionErrorKind {
    GasTooHigh,
    NonceConflict,
    Reverted,
    Network,
    Other,
}

pub type ArbResult<T> = Result<T, ArbError>;
