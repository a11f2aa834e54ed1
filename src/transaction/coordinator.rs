//! Lifecycle of requests submitted by the local account.
//!
//! The `TransactionCoordinator` allows one submission at a time. A submission allocates a fresh
//! sequence number, attaches the entrance fee from the cache as the value transfer, and returns
//! as soon as the remote service accepted it. Confirmation is awaited on a background task; once
//! it settles the pending slot is released, the outcome is reported to the notification sink and,
//! on success, the cache is refreshed before the caller's outcome future resolves.

use crate::chain::{
	Address, Confirmation, NotificationSink, ObservedField, RemoteWriter, RequestDescriptor,
	ServiceTarget, WriterError,
};
use crate::notify::Notification;
use crate::sync::SyncEngine;
use crate::transaction::{
	PendingTransaction, SequenceAllocator, SubmittedTransaction, TransactionError,
};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Configuration for submissions
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
	/// Blocks required on top of (and including) the one holding the transaction.
	pub confirmations: u64,
	/// Give up waiting after this long; the outcome is then reported as unknown.
	pub confirmation_timeout: Duration,
}

impl Default for SubmissionConfig {
	fn default() -> Self {
		Self {
			confirmations: 1,
			confirmation_timeout: Duration::from_secs(120),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingState {
	Idle,
	/// Slot taken while the sequence number is allocated and the request is sent.
	Preparing,
	Awaiting(PendingTransaction),
}

/// Holds the pending slot during preparation and frees it if preparation fails.
struct Reservation {
	slot: Arc<Mutex<PendingState>>,
	armed: bool,
}

impl Reservation {
	fn promote(mut self, pending: PendingTransaction) {
		*self.slot.lock().unwrap_or_else(PoisonError::into_inner) = PendingState::Awaiting(pending);
		self.armed = false;
	}
}

impl Drop for Reservation {
	fn drop(&mut self) {
		if self.armed {
			*self.slot.lock().unwrap_or_else(PoisonError::into_inner) = PendingState::Idle;
		}
	}
}

pub struct TransactionCoordinator {
	engine: Arc<SyncEngine>,
	allocator: SequenceAllocator,
	writer: Arc<dyn RemoteWriter>,
	notifier: Arc<dyn NotificationSink>,
	config: SubmissionConfig,
	slot: Arc<Mutex<PendingState>>,
}

impl TransactionCoordinator {
	pub fn new(
		engine: Arc<SyncEngine>,
		allocator: SequenceAllocator,
		writer: Arc<dyn RemoteWriter>,
		notifier: Arc<dyn NotificationSink>,
		config: SubmissionConfig,
	) -> Self {
		Self {
			engine,
			allocator,
			writer,
			notifier,
			config,
			slot: Arc::new(Mutex::new(PendingState::Idle)),
		}
	}

	/// Whether a submission is being prepared or awaiting confirmation.
	pub fn is_busy(&self) -> bool {
		*self.slot.lock().unwrap_or_else(PoisonError::into_inner) != PendingState::Idle
	}

	pub fn pending(&self) -> Option<PendingTransaction> {
		match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
			PendingState::Awaiting(pending) => Some(pending.clone()),
			_ => None,
		}
	}

	fn reserve(&self) -> Result<Reservation, TransactionError> {
		let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
		if *slot != PendingState::Idle {
			return Err(TransactionError::SubmissionInProgress);
		}
		*slot = PendingState::Preparing;
		Ok(Reservation {
			slot: self.slot.clone(),
			armed: true,
		})
	}

	/// Resolve the sender, the target and a fresh sequence number.
	async fn prepare(&self) -> Result<(Address, ServiceTarget, u64), TransactionError> {
		let context = self.engine.context().await;
		let target = self
			.engine
			.target()
			.await
			.ok_or(TransactionError::NotConnected)?;
		let sequence = self.allocator.allocate(context.account.as_ref()).await?;
		let from = context.account.ok_or(TransactionError::ActorUnavailable)?;
		Ok((from, target, sequence))
	}

	/// Submit a request. Returns once the remote service accepted it; the confirmation outcome
	/// is available through the returned handle.
	pub async fn submit(
		&self,
		mut request: RequestDescriptor,
	) -> Result<SubmittedTransaction, TransactionError> {
		let reservation = self.reserve()?;

		let (from, target, sequence) = match self.prepare().await {
			Ok(prepared) => prepared,
			Err(e) => {
				error!("Cannot submit {}: {}", request.function, e);
				self.notifier
					.notify(Notification::error("Transaction Not Sent", e.to_string()));
				return Err(e);
			}
		};

		request.nonce = Some(sequence);
		if request.value.is_none() {
			request.value = Some(self.engine.cache().value(ObservedField::EntranceFee));
		}

		info!(
			"Submitting {} to {} with sequence {} and value {:?}",
			request.function, target, sequence, request.value
		);

		let handle = match self.writer.send(&target, &from, &request).await {
			Ok(handle) => handle,
			Err(e) => {
				let reason = match e {
					WriterError::Rejected(reason) => reason,
					other => other.to_string(),
				};
				error!("Submission of {} rejected: {}", request.function, reason);
				self.notifier
					.notify(Notification::error("Transaction Rejected", reason.clone()));
				return Err(TransactionError::SubmissionRejected(reason));
			}
		};

		let pending = PendingTransaction {
			sequence_number: sequence,
			handle: handle.clone(),
			required_confirmations: self.config.confirmations,
			target,
		};
		reservation.promote(pending.clone());

		let (outcome_tx, outcome_rx) = oneshot::channel();
		let settle = Settle {
			engine: self.engine.clone(),
			writer: self.writer.clone(),
			notifier: self.notifier.clone(),
			slot: self.slot.clone(),
			timeout: self.config.confirmation_timeout,
		};
		tokio::spawn(async move {
			let result = settle.run(pending).await;
			// The caller may have dropped its handle; the outcome was already notified.
			let _ = outcome_tx.send(result);
		});

		Ok(SubmittedTransaction::new(handle.tx_hash, sequence, outcome_rx))
	}
}

/// Background half of a submission.
struct Settle {
	engine: Arc<SyncEngine>,
	writer: Arc<dyn RemoteWriter>,
	notifier: Arc<dyn NotificationSink>,
	slot: Arc<Mutex<PendingState>>,
	timeout: Duration,
}

impl Settle {
	async fn run(self, pending: PendingTransaction) -> Result<Confirmation, TransactionError> {
		let tx_hash = pending.handle.tx_hash.clone();
		let waited = tokio::time::timeout(
			self.timeout,
			self.writer
				.await_confirmation(&pending.handle, pending.required_confirmations),
		)
		.await;

		{
			let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
			if *slot == PendingState::Awaiting(pending.clone()) {
				*slot = PendingState::Idle;
			}
		}

		let result = match waited {
			Ok(Ok(confirmation)) => Ok(confirmation),
			Ok(Err(WriterError::Rejected(reason))) => Err(TransactionError::SubmissionRejected(reason)),
			Ok(Err(e)) => Err(TransactionError::ConfirmationFailed {
				tx_hash: tx_hash.clone(),
				reason: e.to_string(),
			}),
			Err(_) => Err(TransactionError::ConfirmationTimeout {
				tx_hash: tx_hash.clone(),
			}),
		};

		if self.engine.target().await.as_ref() != Some(&pending.target) {
			debug!("Discarding outcome of {}, context changed meanwhile", tx_hash);
			return Err(TransactionError::Abandoned { tx_hash });
		}

		match &result {
			Ok(confirmation) => {
				info!(
					"Transaction {} confirmed in block {}",
					tx_hash, confirmation.block_number
				);
				self.notifier.notify(Notification::success(
					"Transaction Confirmed",
					"Your transaction has been confirmed on the blockchain",
				));
				if let Err(e) = self.engine.refresh().await {
					warn!("Refresh after {} failed: {}", tx_hash, e);
				}
			}
			Err(e) if e.is_indeterminate() => {
				warn!("Outcome of {} unknown: {}", tx_hash, e);
				self.notifier.notify(Notification::warning(
					"Transaction Outcome Unknown",
					format!("{}. Refresh to check whether it took effect.", e),
				));
			}
			Err(e) => {
				error!("Transaction {} failed: {}", tx_hash, e);
				self.notifier
					.notify(Notification::error("Transaction Failed", e.to_string()));
			}
		}

		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::notify::NotificationKind;
	use crate::registry::ServiceAddressRegistry;
	use crate::sync::{ConnectionContext, SyncConfig};
	use crate::testing::*;
	use std::collections::HashMap;
	use std::sync::atomic::Ordering;

	async fn setup(
		behavior: ConfirmationBehavior,
		account: Option<crate::chain::Address>,
	) -> (Fakes, Arc<SyncEngine>, TransactionCoordinator) {
		let fakes = Fakes::new(behavior);
		let registry = ServiceAddressRegistry::new(HashMap::from([
			(31337, vec![RAFFLE_ADDRESS.parse().unwrap()]),
			(5, vec![OTHER_ADDRESS.parse().unwrap()]),
		]));
		let engine = SyncEngine::new(
			fakes.reader.clone(),
			fakes.channel.clone(),
			registry,
			fakes.sink.clone(),
			SyncConfig::default(),
		);
		engine
			.update_context(ConnectionContext::connected(31337, account))
			.await
			.unwrap();
		let coordinator = TransactionCoordinator::new(
			engine.clone(),
			SequenceAllocator::new(fakes.accounts.clone()),
			fakes.writer.clone(),
			fakes.sink.clone(),
			SubmissionConfig {
				confirmations: 1,
				confirmation_timeout: Duration::from_secs(30),
			},
		);
		(fakes, engine, coordinator)
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_confirms_and_refreshes() {
		let (fakes, engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;

		let submitted = coordinator.submit(RequestDescriptor::default()).await.unwrap();
		assert_eq!(submitted.sequence_number, 5);
		assert!(coordinator.is_busy());
		assert_eq!(coordinator.pending().unwrap().sequence_number, 5);

		{
			let sent = fakes.writer.sent.lock().unwrap();
			let (sent_target, from, request) = &sent[0];
			assert_eq!(*sent_target, target(31337));
			assert_eq!(*from, player());
			assert_eq!(request.nonce, Some(5));
			assert_eq!(request.value.as_deref(), Some("100"));
			assert_eq!(request.function, "enterRaffle()");
		}

		fakes.reader.set_values("100", "4", "0xABC", "0");
		fakes.writer.release();
		let confirmation = submitted.outcome().await.unwrap();

		assert_eq!(confirmation.confirmations, 1);
		assert!(!coordinator.is_busy());
		assert_eq!(engine.cache().get("participantCount").unwrap(), "4");
		assert_eq!(fakes.sink.count(NotificationKind::Success), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_while_pending_is_refused() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;

		let first = coordinator.submit(RequestDescriptor::default()).await.unwrap();
		let reads = fakes.accounts.reads.load(Ordering::SeqCst);

		let second = coordinator.submit(RequestDescriptor::default()).await;
		assert!(matches!(second, Err(TransactionError::SubmissionInProgress)));
		assert_eq!(fakes.writer.send_count(), 1);
		assert_eq!(fakes.accounts.reads.load(Ordering::SeqCst), reads);

		fakes.writer.release();
		first.outcome().await.unwrap();
		assert!(coordinator.submit(RequestDescriptor::default()).await.is_ok());
		assert_eq!(fakes.writer.send_count(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_without_actor() {
		let (fakes, _engine, coordinator) = setup(ConfirmationBehavior::Confirm, None).await;

		let result = coordinator.submit(RequestDescriptor::default()).await;

		assert!(matches!(result, Err(TransactionError::ActorUnavailable)));
		assert!(!coordinator.is_busy());
		assert!(coordinator.pending().is_none());
		assert_eq!(fakes.writer.send_count(), 0);
		assert_eq!(fakes.sink.count(NotificationKind::Error), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sequence_failure_is_notified() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;
		fakes.accounts.unavailable.store(true, Ordering::SeqCst);

		let result = coordinator.submit(RequestDescriptor::default()).await;

		assert!(matches!(result, Err(TransactionError::SequenceUnavailable(_))));
		assert!(!coordinator.is_busy());
		assert_eq!(fakes.writer.send_count(), 0);
		assert_eq!(fakes.sink.count(NotificationKind::Error), 1);
		assert_eq!(fakes.sink.titles(), vec!["Transaction Not Sent".to_string()]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_while_disconnected_is_notified() {
		let (fakes, engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;
		engine.disconnect().await;

		let result = coordinator.submit(RequestDescriptor::default()).await;

		assert!(matches!(result, Err(TransactionError::NotConnected)));
		assert!(!coordinator.is_busy());
		assert_eq!(fakes.accounts.reads.load(Ordering::SeqCst), 0);
		assert_eq!(fakes.sink.count(NotificationKind::Error), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejected_submission_is_surfaced() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;
		fakes.writer.reject_sends("insufficient funds");

		let result = coordinator.submit(RequestDescriptor::default()).await;

		assert!(matches!(
			result,
			Err(TransactionError::SubmissionRejected(reason)) if reason == "insufficient funds"
		));
		assert!(!coordinator.is_busy());
		assert_eq!(fakes.sink.count(NotificationKind::Error), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_reverted_transaction_does_not_refresh() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Revert, Some(player())).await;
		let submitted = coordinator.submit(RequestDescriptor::default()).await.unwrap();
		let reads = fakes.reader.calls();

		fakes.writer.release();
		let result = submitted.outcome().await;

		assert!(matches!(result, Err(TransactionError::SubmissionRejected(_))));
		assert_eq!(fakes.reader.calls(), reads);
		assert_eq!(fakes.sink.count(NotificationKind::Error), 1);
		assert!(!coordinator.is_busy());
	}

	#[tokio::test(start_paused = true)]
	async fn test_confirmation_timeout_is_indeterminate() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Hang, Some(player())).await;
		let submitted = coordinator.submit(RequestDescriptor::default()).await.unwrap();
		let reads = fakes.reader.calls();

		let error = submitted.outcome().await.unwrap_err();

		assert!(matches!(error, TransactionError::ConfirmationTimeout { .. }));
		assert!(error.is_indeterminate());
		assert_eq!(fakes.reader.calls(), reads);
		assert_eq!(fakes.sink.count(NotificationKind::Warning), 1);
		assert_eq!(fakes.sink.count(NotificationKind::Success), 0);
		assert!(!coordinator.is_busy());
	}

	#[tokio::test(start_paused = true)]
	async fn test_outcome_after_context_change_is_discarded() {
		let (fakes, engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;
		let submitted = coordinator.submit(RequestDescriptor::default()).await.unwrap();

		engine
			.update_context(ConnectionContext::connected(5, Some(player())))
			.await
			.unwrap();
		fakes.writer.release();

		let result = submitted.outcome().await;
		assert!(matches!(result, Err(TransactionError::Abandoned { .. })));
		assert_eq!(fakes.sink.count(NotificationKind::Success), 0);
		assert!(!coordinator.is_busy());
	}

	#[tokio::test(start_paused = true)]
	async fn test_explicit_value_is_kept() {
		let (fakes, _engine, coordinator) =
			setup(ConfirmationBehavior::Confirm, Some(player())).await;

		coordinator
			.submit(RequestDescriptor::enter_raffle().with_value("250"))
			.await
			.unwrap();

		let sent = fakes.writer.sent.lock().unwrap();
		assert_eq!(sent[0].2.value.as_deref(), Some("250"));
	}
}
