//!
//! Websocket event channel for logs emitted by the raffle service.
//!
//! Each subscription opens its own websocket, performs an `eth_subscribe("logs")` handshake
//! filtered on the service address and the event topic, and spawns a worker that forwards
//! every notification to the registered handler. Closing the subscription sends
//! `eth_unsubscribe` and closes the socket.

use super::{abi, client::extract_result, types::*};
use crate::chain::{
	ChainEvent, ChannelError, EventChannel, EventHandler, ServiceTarget, SubscriptionHandle,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Request id of the subscribe call on a fresh socket.
const SUBSCRIBE_REQUEST_ID: u64 = 1;
const UNSUBSCRIBE_REQUEST_ID: u64 = 2;

/// Event channel backed by a node's websocket endpoint.
#[derive(Clone)]
pub struct WsEventChannel {
	/// The websocket URL for subscriptions.
	ws_url: String,
	/// Bound on connecting and receiving the subscription id.
	handshake_timeout: Duration,
}

impl WsEventChannel {
	pub fn new(ws_url: String) -> Self {
		Self {
			ws_url,
			handshake_timeout: Duration::from_secs(30),
		}
	}

	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}
}

/// Turn a delivered log into a chain event.
pub(crate) fn log_to_event(event_name: &str, log: LogEntry) -> ChainEvent {
	ChainEvent {
		name: event_name.to_string(),
		address: log.address.parse().ok(),
		topics: log.topics,
		data: log.data,
		block_number: log
			.block_number
			.as_deref()
			.and_then(|block| parse_quantity(block).ok()),
		transaction_hash: log.transaction_hash,
	}
}

/// Extract the log carried by an `eth_subscription` notification for `subscription_id`.
///
/// Returns `Ok(None)` for messages that are not notifications of this subscription.
pub(crate) fn parse_notification(
	text: &str,
	subscription_id: &str,
) -> Result<Option<LogEntry>, RpcError> {
	let parsed: serde_json::Value = serde_json::from_str(text)?;
	if parsed.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
		return Ok(None);
	}

	let params = parsed
		.get("params")
		.ok_or_else(|| RpcError::ProtocolError("notification without params".to_string()))?;
	if params.get("subscription").and_then(|s| s.as_str()) != Some(subscription_id) {
		return Ok(None);
	}

	let result = params
		.get("result")
		.cloned()
		.ok_or(RpcError::NoResult)?;
	Ok(Some(serde_json::from_value(result)?))
}

#[async_trait::async_trait]
impl EventChannel for WsEventChannel {
	async fn subscribe(
		&self,
		target: &ServiceTarget,
		event_signature: &str,
		handler: EventHandler,
	) -> Result<SubscriptionHandle, ChannelError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		let handshake = async {
			let (ws_stream, response) = connect_async(self.ws_url.as_str())
				.await
				.map_err(RpcError::from)?;
			debug!(
				"WebSocket connection established, response status: {}",
				response.status()
			);
			let (mut ws_sender, mut ws_receiver) = ws_stream.split();

			let subscribe_message = json!({
				"jsonrpc": "2.0",
				"id": SUBSCRIBE_REQUEST_ID,
				"method": "eth_subscribe",
				"params": ["logs", {
					"address": target.address.as_str(),
					"topics": [abi::event_topic(event_signature)]
				}]
			});
			ws_sender
				.send(Message::Text(subscribe_message.to_string()))
				.await
				.map_err(RpcError::from)?;

			// Wait for the subscription id
			let subscription_id = loop {
				let Some(msg) = ws_receiver.next().await else {
					return Err(ChannelError::Subscription(
						"connection closed during handshake".to_string(),
					));
				};
				match msg.map_err(RpcError::from)? {
					Message::Text(text) => {
						let mut parsed: serde_json::Value =
							serde_json::from_str(&text).map_err(RpcError::from)?;
						if parsed.get("id").and_then(|id| id.as_u64()) != Some(SUBSCRIBE_REQUEST_ID) {
							debug!("Ignoring message during handshake: {}", text);
							continue;
						}
						let result = extract_result(&mut parsed)?;
						break result
							.as_str()
							.ok_or_else(|| {
								ChannelError::Subscription(format!(
									"unexpected subscription id: {}",
									result
								))
							})?
							.to_string();
					}
					Message::Ping(_) | Message::Pong(_) => continue,
					_ => {
						return Err(ChannelError::Subscription(
							"Unexpected message type during handshake".to_string(),
						));
					}
				}
			};

			Ok::<_, ChannelError>((ws_sender, ws_receiver, subscription_id))
		};

		let (mut ws_sender, mut ws_receiver, subscription_id) =
			tokio::time::timeout(self.handshake_timeout, handshake)
				.await
				.map_err(|_| ChannelError::Timeout(self.handshake_timeout))??;

		info!(
			"Subscribed to {} on {} (subscription {})",
			event_signature, target, subscription_id
		);

		let event_name = abi::event_name(event_signature).to_string();
		let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
		let (closed_tx, closed_rx) = watch::channel(false);
		let worker_id = subscription_id.clone();
		let worker_event = event_name.clone();

		let worker = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = &mut shutdown_rx => {
						let unsubscribe = json!({
							"jsonrpc": "2.0",
							"id": UNSUBSCRIBE_REQUEST_ID,
							"method": "eth_unsubscribe",
							"params": [worker_id]
						});
						if let Err(e) = ws_sender.send(Message::Text(unsubscribe.to_string())).await {
							debug!("Failed to send eth_unsubscribe: {}", e);
						}
						if let Err(e) = ws_sender.close().await {
							debug!("Failed to close websocket: {}", e);
						}
						debug!("Subscription {} closed", worker_id);
						break;
					}
					msg = ws_receiver.next() => {
						match msg {
							Some(Ok(Message::Text(text))) => {
								match parse_notification(&text, &worker_id) {
									Ok(Some(log)) if log.removed => {
										debug!("Ignoring removed log for {}", worker_event);
									}
									Ok(Some(log)) => {
										let event = log_to_event(&worker_event, log);
										debug!("Received {} event: {:?}", worker_event, event);
										handler(event).await;
									}
									Ok(None) => debug!("Ignoring message: {}", text),
									Err(e) => error!("Failed to parse subscription message: {}", e),
								}
							}
							Some(Ok(Message::Close(_))) | None => {
								warn!("Subscription {} closed by the remote side", worker_id);
								let _ = closed_tx.send(true);
								break;
							}
							Some(Ok(_)) => {}
							Some(Err(e)) => {
								error!("Error in event subscription: {}", e);
								let _ = closed_tx.send(true);
								break;
							}
						}
					}
				}
			}
		});

		Ok(SubscriptionHandle::new(subscription_id, event_name, closed_rx)
			.with_worker(shutdown_tx, worker))
	}

	async fn unsubscribe(&self, handle: SubscriptionHandle) {
		debug!("Unsubscribing {} ({})", handle.id, handle.event_name);
		handle.close().await;
	}
}
