//! Sync engine and integration point between the remote service and the local cache.
//!
//! The `SyncEngine` owns the subscription lifecycle. It moves through
//! `Disconnected → Connecting → Subscribed` whenever the connection context yields a deployed
//! service and connectivity is available, tears the previous subscription down before creating a
//! new one on every context change, and refreshes the cache on entry, on every watched event, and
//! optionally on a fixed polling interval.
//!
//! Every subscription and refresh is tagged with the context epoch it was started under. Work
//! that finishes after the epoch moved on is dropped instead of being applied to the new context.
//! When the channel reports that the remote side ended a subscription, the engine falls back to
//! `Disconnected` and re-enters the same context with exponential backoff.

use crate::chain::{
	Address, ChainEvent, ChannelError, EventChannel, EventHandler, NotificationSink, RemoteReader,
	ServiceTarget, SubscriptionHandle,
};
use crate::notify::Notification;
use crate::registry::{Deployment, ServiceAddressRegistry};
use crate::rpc::abi;
use crate::sync::cache::{ChainStateCache, RefreshOutcome};

use backoff::{ExponentialBackoff, future::retry};
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
	Disconnected,
	Connecting,
	Subscribed,
}

/// What the connectivity layer currently provides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionContext {
	pub network_id: Option<u64>,
	/// Active account of the wallet, if one is unlocked.
	pub account: Option<Address>,
	/// Whether a provider is available at all.
	pub connected: bool,
}

impl ConnectionContext {
	pub fn connected(network_id: u64, account: Option<Address>) -> Self {
		Self {
			network_id: Some(network_id),
			account,
			connected: true,
		}
	}
}

/// Event the engine reacts to and the notification it raises for it.
#[derive(Debug, Clone)]
pub struct WatchedEvent {
	pub signature: String,
	pub title: String,
	pub message: String,
}

impl WatchedEvent {
	/// Watch `signature`, with notification text matching the event it names.
	pub fn for_signature(signature: impl Into<String>) -> Self {
		let signature = signature.into();
		let (title, message) = match abi::event_name(&signature) {
			"RequestedRaffleWinner" => (
				"Raffle Winner Requested".to_string(),
				"A raffle winner has been requested".to_string(),
			),
			name => (
				format!("{} Received", name),
				format!("The raffle emitted {}", name),
			),
		};
		Self {
			signature,
			title,
			message,
		}
	}
}

impl Default for WatchedEvent {
	fn default() -> Self {
		Self::for_signature("RequestedRaffleWinner(uint256)")
	}
}

/// Configuration for the sync engine
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
	pub watched_event: WatchedEvent,
	/// Periodic refresh while subscribed, in addition to event-triggered ones.
	pub poll_interval: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Subscription error: {0}")]
	Subscription(#[from] ChannelError),

	#[error("Not subscribed to a deployed service")]
	NotSubscribed,
}

struct EngineInner {
	state: SyncState,
	context: ConnectionContext,
	target: Option<ServiceTarget>,
	subscription: Option<SubscriptionHandle>,
	poller: Option<JoinHandle<()>>,
	/// Watches the live subscription for a remote close.
	watchdog: Option<JoinHandle<()>>,
}

pub struct SyncEngine {
	reader: Arc<dyn RemoteReader>,
	channel: Arc<dyn EventChannel>,
	registry: ServiceAddressRegistry,
	notifier: Arc<dyn NotificationSink>,
	cache: Arc<ChainStateCache>,
	config: SyncConfig,
	/// Bumped on every teardown; tags subscriptions, refreshes and pending transactions.
	epoch: AtomicU64,
	inner: Mutex<EngineInner>,
}

impl SyncEngine {
	pub fn new(
		reader: Arc<dyn RemoteReader>,
		channel: Arc<dyn EventChannel>,
		registry: ServiceAddressRegistry,
		notifier: Arc<dyn NotificationSink>,
		config: SyncConfig,
	) -> Arc<Self> {
		Arc::new(Self {
			reader,
			channel,
			registry,
			notifier,
			cache: Arc::new(ChainStateCache::new()),
			config,
			epoch: AtomicU64::new(0),
			inner: Mutex::new(EngineInner {
				state: SyncState::Disconnected,
				context: ConnectionContext::default(),
				target: None,
				subscription: None,
				poller: None,
				watchdog: None,
			}),
		})
	}

	pub fn cache(&self) -> &Arc<ChainStateCache> {
		&self.cache
	}

	pub fn epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}

	pub async fn state(&self) -> SyncState {
		self.inner.lock().await.state
	}

	pub async fn context(&self) -> ConnectionContext {
		self.inner.lock().await.context.clone()
	}

	/// Service the engine is currently subscribed to.
	pub async fn target(&self) -> Option<ServiceTarget> {
		self.inner.lock().await.target.clone()
	}

	fn resolve(&self, context: &ConnectionContext) -> Option<ServiceTarget> {
		match (context.connected, context.network_id) {
			(true, Some(network_id)) => match self.registry.lookup(network_id) {
				Deployment::Deployed(address) => Some(ServiceTarget {
					network_id,
					address,
				}),
				Deployment::NotDeployed => {
					warn!("No raffle deployment known for network {}", network_id);
					None
				}
			},
			_ => None,
		}
	}

	/// Apply a new connection context.
	///
	/// If anything changed, the current subscription is torn down first. The engine then
	/// subscribes again if the network has a deployment and a provider is available, and runs the
	/// initial refresh. The engine lock is not held while the channel subscribes, so readers of
	/// the engine state are never blocked by a slow node.
	pub async fn update_context(
		self: &Arc<Self>,
		context: ConnectionContext,
	) -> Result<SyncState, SyncError> {
		let target = self.resolve(&context);

		let (epoch, stale) = {
			let mut inner = self.inner.lock().await;
			if inner.context == context {
				match inner.state {
					SyncState::Subscribed if inner.target == target => {
						debug!("Connection context unchanged, keeping subscription");
						return Ok(SyncState::Subscribed);
					}
					SyncState::Connecting => {
						debug!("Connection context unchanged, subscription in progress");
						return Ok(SyncState::Connecting);
					}
					_ => {}
				}
			}

			let stale = self.teardown(&mut inner);
			inner.context = context;
			if target.is_some() {
				inner.state = SyncState::Connecting;
			}
			(self.epoch(), stale)
		};
		self.release(stale).await;

		let Some(target) = target else {
			return Ok(SyncState::Disconnected);
		};
		info!("Connecting to raffle service {}", target);

		let handler = self.event_handler(epoch);
		let subscribed = self
			.channel
			.subscribe(&target, &self.config.watched_event.signature, handler)
			.await;

		let mut inner = self.inner.lock().await;
		if self.epoch() != epoch {
			let state = inner.state;
			drop(inner);
			debug!("Context changed while subscribing to {}, dropping it", target);
			if let Ok(subscription) = subscribed {
				self.channel.unsubscribe(subscription).await;
			}
			return Ok(state);
		}

		let subscription = match subscribed {
			Ok(subscription) => subscription,
			Err(e) => {
				warn!("Failed to subscribe to {}: {}", target, e);
				inner.state = SyncState::Disconnected;
				return Err(e.into());
			}
		};

		inner.watchdog = Some(self.spawn_watchdog(epoch, subscription.closed()));
		inner.subscription = Some(subscription);
		inner.target = Some(target.clone());
		inner.state = SyncState::Subscribed;
		if let Some(interval) = self.config.poll_interval {
			inner.poller = Some(self.spawn_poller(epoch, interval));
		}
		drop(inner);

		info!("Subscribed to raffle service {}", target);
		self.refresh_tagged(epoch, &target).await;
		Ok(SyncState::Subscribed)
	}

	/// Drop the subscription and return to `Disconnected`.
	pub async fn disconnect(&self) {
		let stale = {
			let mut inner = self.inner.lock().await;
			let stale = self.teardown(&mut inner);
			inner.context = ConnectionContext::default();
			stale
		};
		self.release(stale).await;
	}

	/// Move to `Disconnected` and hand back the subscription to release once unlocked.
	fn teardown(&self, inner: &mut EngineInner) -> Option<SubscriptionHandle> {
		self.epoch.fetch_add(1, Ordering::SeqCst);
		if let Some(poller) = inner.poller.take() {
			poller.abort();
		}
		if let Some(watchdog) = inner.watchdog.take() {
			watchdog.abort();
		}
		inner.target = None;
		inner.state = SyncState::Disconnected;
		inner.subscription.take()
	}

	async fn release(&self, subscription: Option<SubscriptionHandle>) {
		if let Some(subscription) = subscription {
			info!("Tearing down subscription {}", subscription.id);
			self.channel.unsubscribe(subscription).await;
		}
	}

	/// The remote side ended the subscription of `epoch`: tear it down and enter again.
	async fn on_subscription_lost(self: &Arc<Self>, epoch: u64) {
		let (context, stale) = {
			let mut inner = self.inner.lock().await;
			if self.epoch() != epoch {
				return;
			}
			if let Some(target) = &inner.target {
				warn!("Subscription to {} lost, reconnecting", target);
			}
			// Called from the watchdog itself; detach it rather than aborting it.
			inner.watchdog.take();
			let stale = self.teardown(&mut inner);
			(inner.context.clone(), stale)
		};
		self.release(stale).await;
		self.reconnect(context).await;
	}

	/// Re-enter `context` with exponential backoff until it succeeds or the context moves on.
	async fn reconnect(self: &Arc<Self>, context: ConnectionContext) {
		let backoff = ExponentialBackoff {
			initial_interval: Duration::from_secs(1),
			max_interval: Duration::from_secs(30),
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		let result = retry(backoff, || {
			let engine = self.clone();
			let context = context.clone();
			async move {
				if !engine.awaits_reconnect(&context).await {
					debug!("Connection context moved on, abandoning reconnect");
					return Ok(());
				}
				match engine.update_context(context).await {
					Ok(state) => {
						debug!("Reconnect attempt finished in state {:?}", state);
						Ok(())
					}
					Err(e) => {
						warn!("Reconnect attempt failed: {}", e);
						Err(backoff::Error::transient(e))
					}
				}
			}
		})
		.await;

		if let Err(e) = result {
			warn!("Giving up on reconnecting: {}", e);
		}
	}

	async fn awaits_reconnect(&self, context: &ConnectionContext) -> bool {
		let inner = self.inner.lock().await;
		inner.state == SyncState::Disconnected && inner.context == *context
	}

	fn spawn_watchdog(self: &Arc<Self>, epoch: u64, mut closed: watch::Receiver<bool>) -> JoinHandle<()> {
		let engine: Weak<Self> = Arc::downgrade(self);
		tokio::spawn(async move {
			// A sender dropped without flipping the flag means the subscription was closed locally.
			let lost = closed.wait_for(|closed| *closed).await.is_ok();
			if !lost {
				return;
			}
			if let Some(engine) = engine.upgrade() {
				engine.on_subscription_lost(epoch).await;
			}
		})
	}

	/// Refresh the cache from the currently subscribed service.
	pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
		let (epoch, target) = {
			let inner = self.inner.lock().await;
			let target = inner.target.clone().ok_or(SyncError::NotSubscribed)?;
			(self.epoch(), target)
		};
		Ok(self.refresh_tagged(epoch, &target).await)
	}

	async fn refresh_tagged(&self, epoch: u64, target: &ServiceTarget) -> RefreshOutcome {
		let reads = self.cache.read_all(self.reader.as_ref(), target).await;
		if self.epoch() != epoch {
			debug!("Discarding refresh of {}, context changed meanwhile", target);
			return RefreshOutcome::discarded();
		}
		let outcome = self.cache.commit(reads);
		debug!("Refresh of {} finished: {:?}", target, outcome);
		outcome
	}

	/// Handle a delivered event: refresh, then notify regardless of the refresh result.
	pub async fn on_event(&self, epoch: u64, event: ChainEvent) {
		if self.epoch() != epoch {
			debug!("Ignoring {} event from a torn down subscription", event.name);
			return;
		}
		info!(
			"{} event received (block {:?}, tx {:?})",
			event.name, event.block_number, event.transaction_hash
		);

		let target = self.inner.lock().await.target.clone();
		let Some(target) = target else {
			return;
		};
		let outcome = self.refresh_tagged(epoch, &target).await;
		if outcome.discarded {
			return;
		}
		if !outcome.is_complete() {
			warn!("Refresh after {} left {} field(s) stale", event.name, outcome.failed.len());
		}

		let watched = &self.config.watched_event;
		self.notifier
			.notify(Notification::info(watched.title.clone(), watched.message.clone()));
	}

	fn event_handler(self: &Arc<Self>, epoch: u64) -> EventHandler {
		let engine: Weak<Self> = Arc::downgrade(self);
		Arc::new(move |event: ChainEvent| {
			let engine = engine.clone();
			async move {
				if let Some(engine) = engine.upgrade() {
					engine.on_event(epoch, event).await;
				}
			}
			.boxed()
		})
	}

	fn spawn_poller(self: &Arc<Self>, epoch: u64, interval: Duration) -> JoinHandle<()> {
		let engine: Weak<Self> = Arc::downgrade(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			// The first tick fires immediately; entry already refreshed.
			ticker.tick().await;
			loop {
				ticker.tick().await;
				let Some(engine) = engine.upgrade() else {
					break;
				};
				if engine.epoch() != epoch {
					break;
				}
				let target = engine.inner.lock().await.target.clone();
				if let Some(target) = target {
					engine.refresh_tagged(epoch, &target).await;
				}
			}
		})
	}
}
