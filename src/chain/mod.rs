//! Chain Client — RPC + event-subscription abstraction per chain (§4.1).
//!
//! Author: AI-Generated
//! Created: 2026-07-28

mod client;
mod nonce;

pub use client::{ChainClient, PoolEventData, PoolEventKind, RawPoolEvent};
pub use nonce::NonceManager;
