//!
//! Utility module for the raffle client.
//!
//! Re-exports formatting helpers and other utility functions for use throughout the codebase.
/// Utility functions for formatting and display
pub mod index;

pub use index::format_token_amount;

/// Number of decimal places of the chain's native token.
pub const NATIVE_TOKEN_DECIMALS: u32 = 18;
