//! In-memory collaborators for unit tests.

use crate::chain::*;
use crate::notify::{Notification, NotificationKind};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};

pub const RAFFLE_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const OTHER_ADDRESS: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
pub const PLAYER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

pub fn target(network_id: u64) -> ServiceTarget {
	ServiceTarget {
		network_id,
		address: RAFFLE_ADDRESS.parse().unwrap(),
	}
}

pub fn player() -> Address {
	PLAYER.parse().unwrap()
}

/// Reader serving fixed values, with optional one-shot scripted responses per field.
pub struct ScriptedReader {
	values: Mutex<HashMap<ObservedField, Option<String>>>,
	scripts: Mutex<HashMap<ObservedField, VecDeque<(Duration, Option<String>)>>>,
	delay: Mutex<Duration>,
	calls: AtomicUsize,
}

impl ScriptedReader {
	pub fn with_values(fee: &str, participants: &str, winner: &str, phase: &str) -> Self {
		let values = HashMap::from([
			(ObservedField::EntranceFee, Some(fee.to_string())),
			(ObservedField::ParticipantCount, Some(participants.to_string())),
			(ObservedField::LastWinner, Some(winner.to_string())),
			(ObservedField::Phase, Some(phase.to_string())),
		]);
		Self {
			values: Mutex::new(values),
			scripts: Mutex::new(HashMap::new()),
			delay: Mutex::new(Duration::ZERO),
			calls: AtomicUsize::new(0),
		}
	}

	/// Delay applied to unscripted reads.
	pub fn set_delay(&self, delay: Duration) {
		*self.delay.lock().unwrap() = delay;
	}

	/// `None` makes reads of the field fail.
	pub fn set_value(&self, field: ObservedField, value: Option<&str>) {
		self.values
			.lock()
			.unwrap()
			.insert(field, value.map(str::to_string));
	}

	pub fn set_values(&self, fee: &str, participants: &str, winner: &str, phase: &str) {
		self.set_value(ObservedField::EntranceFee, Some(fee));
		self.set_value(ObservedField::ParticipantCount, Some(participants));
		self.set_value(ObservedField::LastWinner, Some(winner));
		self.set_value(ObservedField::Phase, Some(phase));
	}

	pub fn fail_all(&self) {
		for field in ObservedField::ALL {
			self.set_value(field, None);
		}
	}

	/// Queue a response served by the next read of `field`.
	pub fn script(&self, field: ObservedField, delay: Duration, value: Option<&str>) {
		self.scripts
			.lock()
			.unwrap()
			.entry(field)
			.or_default()
			.push_back((delay, value.map(str::to_string)));
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait::async_trait]
impl RemoteReader for ScriptedReader {
	async fn read(&self, _target: &ServiceTarget, field: ObservedField) -> Result<String, ReadError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let scripted = self
			.scripts
			.lock()
			.unwrap()
			.get_mut(&field)
			.and_then(VecDeque::pop_front);
		let (delay, value) = match scripted {
			Some(entry) => entry,
			None => (
				*self.delay.lock().unwrap(),
				self.values.lock().unwrap().get(&field).cloned().flatten(),
			),
		};
		tokio::time::sleep(delay).await;
		value.ok_or_else(|| ReadError::Failed(format!("{} unavailable", field)))
	}
}

/// Account nonce source that can be advanced "externally".
#[derive(Default)]
pub struct FakeAccounts {
	pub count: AtomicU64,
	pub reads: AtomicUsize,
	/// Makes every read fail.
	pub unavailable: AtomicBool,
}

impl FakeAccounts {
	pub fn starting_at(count: u64) -> Self {
		Self {
			count: AtomicU64::new(count),
			..Self::default()
		}
	}
}

#[async_trait::async_trait]
impl AccountReader for FakeAccounts {
	async fn transaction_count(&self, _account: &Address) -> Result<u64, ReadError> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ReadError::Failed("node unreachable".to_string()));
		}
		Ok(self.count.load(Ordering::SeqCst))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationBehavior {
	/// Wait for `release()`, then confirm.
	Confirm,
	/// Wait for `release()`, then report a revert.
	Revert,
	/// Never resolve.
	Hang,
}

/// Writer recording submissions; confirmations are released by the test.
pub struct FakeWriter {
	pub sent: Mutex<Vec<(ServiceTarget, Address, RequestDescriptor)>>,
	reject_send: Mutex<Option<String>>,
	behavior: Mutex<ConfirmationBehavior>,
	gate: Notify,
}

impl FakeWriter {
	pub fn new(behavior: ConfirmationBehavior) -> Self {
		Self {
			sent: Mutex::new(Vec::new()),
			reject_send: Mutex::new(None),
			behavior: Mutex::new(behavior),
			gate: Notify::new(),
		}
	}

	pub fn reject_sends(&self, reason: &str) {
		*self.reject_send.lock().unwrap() = Some(reason.to_string());
	}

	/// Let one waiting confirmation resolve.
	pub fn release(&self) {
		self.gate.notify_one();
	}

	pub fn send_count(&self) -> usize {
		self.sent.lock().unwrap().len()
	}
}

#[async_trait::async_trait]
impl RemoteWriter for FakeWriter {
	async fn send(
		&self,
		target: &ServiceTarget,
		from: &Address,
		request: &RequestDescriptor,
	) -> Result<SubmissionHandle, WriterError> {
		if let Some(reason) = self.reject_send.lock().unwrap().clone() {
			return Err(WriterError::Rejected(reason));
		}
		let mut sent = self.sent.lock().unwrap();
		sent.push((target.clone(), from.clone(), request.clone()));
		Ok(SubmissionHandle {
			tx_hash: format!("0x{:064x}", sent.len()),
		})
	}

	async fn await_confirmation(
		&self,
		handle: &SubmissionHandle,
		depth: u64,
	) -> Result<Confirmation, WriterError> {
		let behavior = *self.behavior.lock().unwrap();
		if behavior == ConfirmationBehavior::Hang {
			std::future::pending::<()>().await;
		}
		self.gate.notified().await;
		match behavior {
			ConfirmationBehavior::Revert => Err(WriterError::Rejected(format!(
				"transaction {} reverted",
				handle.tx_hash
			))),
			_ => Ok(Confirmation {
				tx_hash: handle.tx_hash.clone(),
				block_number: 42,
				confirmations: depth,
			}),
		}
	}
}

struct LiveSubscription {
	id: String,
	target: ServiceTarget,
	handler: EventHandler,
	closed: watch::Sender<bool>,
}

/// Event channel whose deliveries are triggered by the test.
#[derive(Default)]
pub struct FakeChannel {
	live: Mutex<Vec<LiveSubscription>>,
	next_id: AtomicU64,
	pub subscribes: AtomicUsize,
	pub unsubscribes: AtomicUsize,
	pub fail: Mutex<bool>,
	/// Time a subscribe call takes before answering.
	pub subscribe_delay: Mutex<Duration>,
}

impl FakeChannel {
	/// Drop every live subscription as if the node closed the socket.
	pub fn close_remote(&self) {
		for subscription in self.live.lock().unwrap().drain(..) {
			let _ = subscription.closed.send(true);
		}
	}

	pub fn live_count(&self) -> usize {
		self.live.lock().unwrap().len()
	}

	pub fn live_targets(&self) -> Vec<ServiceTarget> {
		self.live
			.lock()
			.unwrap()
			.iter()
			.map(|subscription| subscription.target.clone())
			.collect()
	}

	/// Deliver an event to every live handler, each on its own task.
	pub fn emit(&self, event: ChainEvent) -> Vec<tokio::task::JoinHandle<()>> {
		let handlers: Vec<EventHandler> = self
			.live
			.lock()
			.unwrap()
			.iter()
			.map(|subscription| subscription.handler.clone())
			.collect();
		handlers
			.into_iter()
			.map(|handler| tokio::spawn(handler(event.clone())))
			.collect()
	}
}

#[async_trait::async_trait]
impl EventChannel for FakeChannel {
	async fn subscribe(
		&self,
		target: &ServiceTarget,
		event_signature: &str,
		handler: EventHandler,
	) -> Result<SubscriptionHandle, ChannelError> {
		self.subscribes.fetch_add(1, Ordering::SeqCst);
		let delay = *self.subscribe_delay.lock().unwrap();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if *self.fail.lock().unwrap() {
			return Err(ChannelError::Subscription("refused".to_string()));
		}
		let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
		let (closed, closed_rx) = watch::channel(false);
		self.live.lock().unwrap().push(LiveSubscription {
			id: id.clone(),
			target: target.clone(),
			handler,
			closed,
		});
		Ok(SubscriptionHandle::new(id, event_signature, closed_rx))
	}

	async fn unsubscribe(&self, handle: SubscriptionHandle) {
		self.unsubscribes.fetch_add(1, Ordering::SeqCst);
		self.live
			.lock()
			.unwrap()
			.retain(|subscription| subscription.id != handle.id);
		handle.close().await;
	}
}

#[derive(Default)]
pub struct RecordingSink {
	pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
	pub fn count(&self, kind: NotificationKind) -> usize {
		self.notifications
			.lock()
			.unwrap()
			.iter()
			.filter(|n| n.kind == kind)
			.count()
	}

	pub fn titles(&self) -> Vec<String> {
		self.notifications
			.lock()
			.unwrap()
			.iter()
			.map(|n| n.title.clone())
			.collect()
	}
}

impl NotificationSink for RecordingSink {
	fn notify(&self, notification: Notification) {
		self.notifications.lock().unwrap().push(notification);
	}
}

/// Shared handles to all fakes, for wiring an engine and a coordinator.
pub struct Fakes {
	pub reader: Arc<ScriptedReader>,
	pub accounts: Arc<FakeAccounts>,
	pub writer: Arc<FakeWriter>,
	pub channel: Arc<FakeChannel>,
	pub sink: Arc<RecordingSink>,
}

impl Fakes {
	pub fn new(behavior: ConfirmationBehavior) -> Self {
		Self {
			reader: Arc::new(ScriptedReader::with_values("100", "3", "0xABC", "0")),
			accounts: Arc::new(FakeAccounts::starting_at(5)),
			writer: Arc::new(FakeWriter::new(behavior)),
			channel: Arc::new(FakeChannel::default()),
			sink: Arc::new(RecordingSink::default()),
		}
	}
}
