//! Multi-chain DEX arbitrage engine
//!
//! Off-chain pipeline: Chain Client -> State Mirror -> Pricing Graph ->
//! Arbitrage Detector -> Opportunity Pipeline -> Simulator -> Executor.
//!
//! Author: AI-Generated
//! Created: 2026-01-28
//! Modified: 2026-07-29 — generalized from a single-chain 2-DEX spread bot
//! to a multi-chain cyclic arbitrage engine.

pub mod arbitrage;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod control;
pub mod error;
pub mod execution;
pub mod graph;
pub mod oracle;
pub mod pipeline;
pub mod pool;
pub mod types;

pub use config::EngineConfig;
pub use control::ControlHandle;
pub use error::{ArbError, ArbResult};
pub use types::ArbitrageOpportunity;
