//! Domain types and collaborator interfaces of the sync core.

/// Traits implemented by remote bindings and presentation layers
pub mod interfaces;
/// Shared data types and per-collaborator error types
pub mod types;

pub use interfaces::*;
pub use types::*;
