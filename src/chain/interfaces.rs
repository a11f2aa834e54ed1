//! Seams between the sync core and the outside world.
//!
//! The core only talks to the remote service through these traits. The `rpc` module provides
//! JSON-RPC and websocket backed implementations; tests provide in-memory ones.

use crate::chain::types::{
	Address, ChainEvent, ChannelError, Confirmation, ObservedField, ReadError, RequestDescriptor,
	ServiceTarget, SubmissionHandle, SubscriptionHandle, WriterError,
};
use crate::notify::Notification;

use futures::future::BoxFuture;
use std::sync::Arc;

/// Read-only queries for the observed fields.
#[async_trait::async_trait]
pub trait RemoteReader: Send + Sync {
	/// Read the current value of one field. No batching is assumed.
	async fn read(&self, target: &ServiceTarget, field: ObservedField)
	-> Result<String, ReadError>;
}

/// Account state exposed by the connectivity layer.
#[async_trait::async_trait]
pub trait AccountReader: Send + Sync {
	/// Number of confirmed requests sent by `account`.
	async fn transaction_count(&self, account: &Address) -> Result<u64, ReadError>;
}

/// Submission of sequenced mutating requests.
#[async_trait::async_trait]
pub trait RemoteWriter: Send + Sync {
	/// Submit the request. Returns once the remote service accepted it.
	async fn send(
		&self,
		target: &ServiceTarget,
		from: &Address,
		request: &RequestDescriptor,
	) -> Result<SubmissionHandle, WriterError>;

	/// Wait until the submission is buried under `depth` confirmations.
	async fn await_confirmation(
		&self,
		handle: &SubmissionHandle,
		depth: u64,
	) -> Result<Confirmation, WriterError>;
}

/// Callback invoked for every delivered event.
pub type EventHandler = Arc<dyn Fn(ChainEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Push source for events emitted by the remote service.
///
/// Delivery is at-least-once and unordered relative to concurrent reads.
#[async_trait::async_trait]
pub trait EventChannel: Send + Sync {
	/// Register `handler` for the event with the given signature, e.g. `RequestedRaffleWinner(uint256)`.
	async fn subscribe(
		&self,
		target: &ServiceTarget,
		event_signature: &str,
		handler: EventHandler,
	) -> Result<SubscriptionHandle, ChannelError>;

	async fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Presentation of lifecycle notifications. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
	fn notify(&self, notification: Notification);
}
