//! Client-side state synchronization for an on-chain raffle.
//!
//! Mirrors a fixed set of values from the raffle contract into a local cache, refreshes it when
//! the contract emits events, and drives entries submitted by the local account through
//! sequencing, submission and confirmation.

pub mod chain;
pub mod config;
pub mod notify;
pub mod registry;
pub mod rpc;
pub mod sync;
pub mod transaction;
pub mod utils;

#[cfg(test)]
mod testing;
