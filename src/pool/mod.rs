//! Pool management module for DEX arbitrage bot.
//!
//! Handles pool discovery, state mirroring, and pricing math.

pub mod calculator;
pub mod registry;
pub mod state;

pub use registry::PoolRegistry;
pub use state::StateMirror;
