/// Submission lifecycle and pending slot management
pub mod coordinator;
/// Fresh sequence number allocation
pub mod sequence;
/// Pending transaction and error types
pub mod types;

pub use coordinator::{SubmissionConfig, TransactionCoordinator};
pub use sequence::SequenceAllocator;
pub use types::*;
