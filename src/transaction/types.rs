use crate::chain::{Confirmation, ReadError, ServiceTarget, SubmissionHandle};

use tokio::sync::oneshot;

/// A submitted but not yet confirmed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
	pub sequence_number: u64,
	pub handle: SubmissionHandle,
	pub required_confirmations: u64,
	/// Service the request was sent to; results for another target are discarded.
	pub target: ServiceTarget,
}

/// Error types for the transaction lifecycle
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
	#[error("A submission is already in progress")]
	SubmissionInProgress,

	#[error("No active account is connected")]
	ActorUnavailable,

	#[error("Not connected to a deployed raffle service")]
	NotConnected,

	#[error("Failed to read the account sequence number: {0}")]
	SequenceUnavailable(#[source] ReadError),

	#[error("Submission rejected: {0}")]
	SubmissionRejected(String),

	/// The request may or may not have taken effect; refresh to find out.
	#[error("Timed out waiting for confirmation of {tx_hash}")]
	ConfirmationTimeout { tx_hash: String },

	/// Waiting for the confirmation failed; the outcome is unknown.
	#[error("Lost track of {tx_hash}: {reason}")]
	ConfirmationFailed { tx_hash: String, reason: String },

	/// The context the request was sent under was torn down before it settled.
	#[error("Result for {tx_hash} discarded after a context change")]
	Abandoned { tx_hash: String },
}

impl TransactionError {
	/// Whether the request might still have been applied by the remote service.
	pub fn is_indeterminate(&self) -> bool {
		matches!(
			self,
			TransactionError::ConfirmationTimeout { .. }
				| TransactionError::ConfirmationFailed { .. }
				| TransactionError::Abandoned { .. }
		)
	}
}

/// Handle returned by `submit` once the remote service accepted the request.
#[derive(Debug)]
pub struct SubmittedTransaction {
	pub tx_hash: String,
	pub sequence_number: u64,
	outcome: oneshot::Receiver<Result<Confirmation, TransactionError>>,
}

impl SubmittedTransaction {
	pub(crate) fn new(
		tx_hash: String,
		sequence_number: u64,
		outcome: oneshot::Receiver<Result<Confirmation, TransactionError>>,
	) -> Self {
		Self {
			tx_hash,
			sequence_number,
			outcome,
		}
	}

	/// Wait for the confirmation outcome.
	pub async fn outcome(self) -> Result<Confirmation, TransactionError> {
		match self.outcome.await {
			Ok(result) => result,
			Err(_) => Err(TransactionError::Abandoned {
				tx_hash: self.tx_hash,
			}),
		}
	}
}
