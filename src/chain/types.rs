//! Types shared between the sync engine, the transaction coordinator and the remote bindings.

use crate::rpc::RpcError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// A 20-byte account or contract address in `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let digits = value
			.strip_prefix("0x")
			.or_else(|| value.strip_prefix("0X"))
			.ok_or_else(|| AddressError(value.to_string()))?;
		if digits.len() != 40 || hex::decode(digits).is_err() {
			return Err(AddressError(value.to_string()));
		}
		Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
	}
}

impl TryFrom<String> for Address {
	type Error = AddressError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Address> for String {
	fn from(value: Address) -> Self {
		value.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct AddressError(pub String);

/// A deployed service on a specific network. Everything bound to the remote service
/// (subscriptions, pending transactions, refreshes) is tagged with the target it was created under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTarget {
	pub network_id: u64,
	pub address: Address,
}

impl fmt::Display for ServiceTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.address, self.network_id)
	}
}

/// The fixed set of values mirrored from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObservedField {
	EntranceFee,
	ParticipantCount,
	LastWinner,
	Phase,
}

impl ObservedField {
	pub const ALL: [ObservedField; 4] = [
		ObservedField::EntranceFee,
		ObservedField::ParticipantCount,
		ObservedField::LastWinner,
		ObservedField::Phase,
	];

	pub fn name(&self) -> &'static str {
		match self {
			ObservedField::EntranceFee => "entranceFee",
			ObservedField::ParticipantCount => "participantCount",
			ObservedField::LastWinner => "lastWinner",
			ObservedField::Phase => "phase",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|field| field.name() == name)
	}

	/// Value a consumer sees before the first successful read.
	pub fn default_value(&self) -> &'static str {
		"0"
	}

	pub(crate) fn index(&self) -> usize {
		*self as usize
	}
}

impl fmt::Display for ObservedField {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Point-in-time copy of every observed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
	pub entrance_fee: String,
	pub participant_count: String,
	pub last_winner: String,
	pub phase: String,
}

impl ChainSnapshot {
	pub fn get(&self, field: ObservedField) -> &str {
		match field {
			ObservedField::EntranceFee => &self.entrance_fee,
			ObservedField::ParticipantCount => &self.participant_count,
			ObservedField::LastWinner => &self.last_winner,
			ObservedField::Phase => &self.phase,
		}
	}
}

impl Default for ChainSnapshot {
	fn default() -> Self {
		Self {
			entrance_fee: ObservedField::EntranceFee.default_value().to_string(),
			participant_count: ObservedField::ParticipantCount.default_value().to_string(),
			last_winner: ObservedField::LastWinner.default_value().to_string(),
			phase: ObservedField::Phase.default_value().to_string(),
		}
	}
}

/// A log emitted by the remote service and delivered through an event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
	/// Event name without its parameter list, e.g. `RequestedRaffleWinner`.
	pub name: String,
	pub address: Option<Address>,
	pub topics: Vec<String>,
	pub data: String,
	pub block_number: Option<u64>,
	pub transaction_hash: Option<String>,
}

impl ChainEvent {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			address: None,
			topics: Vec::new(),
			data: String::new(),
			block_number: None,
			transaction_hash: None,
		}
	}
}

/// A state-mutating call to submit to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
	/// Solidity-style signature of the called function, e.g. `enterRaffle()`.
	pub function: String,
	/// Value transfer in the chain's base unit, as a decimal string.
	pub value: Option<String>,
	/// Sequence number attached by the coordinator right before submission.
	pub nonce: Option<u64>,
}

impl RequestDescriptor {
	pub fn call(function: impl Into<String>) -> Self {
		Self {
			function: function.into(),
			value: None,
			nonce: None,
		}
	}

	pub fn enter_raffle() -> Self {
		Self::call("enterRaffle()")
	}

	pub fn with_value(mut self, value: impl Into<String>) -> Self {
		self.value = Some(value.into());
		self
	}
}

impl Default for RequestDescriptor {
	fn default() -> Self {
		Self::enter_raffle()
	}
}

/// Handle returned once the remote service accepted a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
	pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
	pub tx_hash: String,
	pub block_number: u64,
	pub confirmations: u64,
}

/// A live registration on an event channel.
///
/// Closing the handle stops the delivery worker (if the channel runs one). The channel flips the
/// `closed` signal to `true` when the remote side ends the subscription on its own.
pub struct SubscriptionHandle {
	pub id: String,
	pub event_name: String,
	closed: watch::Receiver<bool>,
	shutdown: Option<oneshot::Sender<()>>,
	worker: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
	pub fn new(
		id: impl Into<String>,
		event_name: impl Into<String>,
		closed: watch::Receiver<bool>,
	) -> Self {
		Self {
			id: id.into(),
			event_name: event_name.into(),
			closed,
			shutdown: None,
			worker: None,
		}
	}

	pub fn with_worker(mut self, shutdown: oneshot::Sender<()>, worker: JoinHandle<()>) -> Self {
		self.shutdown = Some(shutdown);
		self.worker = Some(worker);
		self
	}

	/// Signal that turns `true` once the remote side dropped the subscription.
	///
	/// The sender is dropped without a `true` when the subscription is closed locally.
	pub fn closed(&self) -> watch::Receiver<bool> {
		self.closed.clone()
	}

	pub fn is_closed(&self) -> bool {
		*self.closed.borrow()
	}

	/// Ask the worker to stop and wait for it to finish.
	pub async fn close(mut self) {
		if let Some(shutdown) = self.shutdown.take() {
			// The worker may already be gone if the remote side closed the stream.
			let _ = shutdown.send(());
		}
		if let Some(worker) = self.worker.take() {
			if let Err(e) = worker.await {
				tracing::debug!("Subscription worker {} ended abnormally: {}", self.id, e);
			}
		}
	}
}

impl fmt::Debug for SubscriptionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriptionHandle")
			.field("id", &self.id)
			.field("event_name", &self.event_name)
			.field("closed", &self.is_closed())
			.field("has_worker", &self.worker.is_some())
			.finish()
	}
}

impl Drop for SubscriptionHandle {
	fn drop(&mut self) {
		if let Some(worker) = self.worker.take() {
			worker.abort();
		}
	}
}

/// Failure of a single read against the remote service.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),

	#[error("Decode error: {0}")]
	Decode(String),

	#[error("Read failed: {0}")]
	Failed(String),
}

/// Failure reported by a remote writer.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),

	#[error("Rejected: {0}")]
	Rejected(String),

	#[error("Transaction {0} not mined yet")]
	NotMined(String),

	#[error("Encoding error: {0}")]
	Encoding(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),

	#[error("Subscription error: {0}")]
	Subscription(String),

	#[error("Subscription handshake timed out after {0:?}")]
	Timeout(Duration),
}
