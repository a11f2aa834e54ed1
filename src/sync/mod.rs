//! Chain State Synchronization Module
//!
//! This module keeps the local view of the raffle service in line with the remote state:
//!
//! - `cache`: The observed fields, their defaults, and the ordered commit step every refresh goes through.
//! - `engine`: The subscription lifecycle, event handling and refresh orchestration.
//!
//! The engine is the only component that triggers refreshes; the transaction coordinator asks the
//! engine to refresh after a confirmed submission rather than touching the cache itself.

/// Observed field cache with ordered commits and observers
pub mod cache;
/// Subscription lifecycle and refresh orchestration
pub mod engine;

pub use cache::{CacheError, ChainStateCache, RefreshOutcome, SnapshotObserver};
pub use engine::*;
