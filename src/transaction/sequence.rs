use crate::chain::{AccountReader, Address};
use crate::transaction::TransactionError;

use std::sync::Arc;
use tracing::debug;

/// Produces the sequence number (nonce) for the next submission.
///
/// The count is read from the connectivity layer on every call and never cached, so requests
/// sent by the same account from outside this process are accounted for.
#[derive(Clone)]
pub struct SequenceAllocator {
	accounts: Arc<dyn AccountReader>,
}

impl SequenceAllocator {
	pub fn new(accounts: Arc<dyn AccountReader>) -> Self {
		Self { accounts }
	}

	pub async fn allocate(&self, actor: Option<&Address>) -> Result<u64, TransactionError> {
		let actor = actor.ok_or(TransactionError::ActorUnavailable)?;
		let sequence = self
			.accounts
			.transaction_count(actor)
			.await
			.map_err(TransactionError::SequenceUnavailable)?;
		debug!("Allocated sequence {} for {}", sequence, actor);
		Ok(sequence)
	}
}
