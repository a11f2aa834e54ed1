//!
//! Transaction submission through the node's wallet.
//!
//! Submits raffle calls with `eth_sendTransaction` and tracks them until they are buried under
//! the requested number of blocks. Receipt polling uses exponential backoff the same way other
//! remote calls in this crate are retried.

use super::{
	JsonRpcClient, abi,
	types::{TransactionReceipt, to_quantity},
};
use crate::chain::{
	Address, Confirmation, RemoteWriter, RequestDescriptor, ServiceTarget, SubmissionHandle,
	WriterError,
};

use backoff::{ExponentialBackoff, future::retry};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Remote writer backed by a JSON-RPC node.
#[derive(Clone)]
pub struct RpcWriter {
	client: JsonRpcClient,
	/// Upper bound between two receipt polls.
	max_poll_interval: Duration,
}

impl RpcWriter {
	pub fn new(client: JsonRpcClient) -> Self {
		Self {
			client,
			max_poll_interval: Duration::from_secs(4),
		}
	}

	pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
		self.max_poll_interval = interval;
		self
	}

	/// Backoff without an elapsed-time limit; callers bound the wait themselves.
	fn poll_backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: Duration::from_millis(500),
			max_interval: self.max_poll_interval,
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		}
	}
}

/// Build the `eth_sendTransaction` payload for a request.
pub(crate) fn transaction_payload(
	target: &ServiceTarget,
	from: &Address,
	request: &RequestDescriptor,
) -> Result<serde_json::Value, WriterError> {
	let mut payload = json!({
		"from": from.as_str(),
		"to": target.address.as_str(),
		"data": abi::selector(&request.function),
	});

	if let Some(value) = &request.value {
		let amount = value
			.trim()
			.parse::<u128>()
			.map_err(|_| WriterError::Encoding(format!("invalid value amount: {}", value)))?;
		payload["value"] = json!(to_quantity(amount));
	}
	if let Some(nonce) = request.nonce {
		payload["nonce"] = json!(to_quantity(u128::from(nonce)));
	}

	Ok(payload)
}

/// Block a polled receipt was mined in. A missing receipt is retried; a reverted one is final.
pub(crate) fn mined_block(
	tx_hash: &str,
	receipt: Option<TransactionReceipt>,
) -> Result<u64, backoff::Error<WriterError>> {
	match receipt {
		Some(receipt) if !receipt.succeeded() => Err(backoff::Error::permanent(
			WriterError::Rejected(format!("transaction {} reverted", tx_hash)),
		)),
		Some(receipt) => receipt
			.mined_block()
			.ok_or_else(|| backoff::Error::transient(WriterError::NotMined(tx_hash.to_string()))),
		None => Err(backoff::Error::transient(WriterError::NotMined(
			tx_hash.to_string(),
		))),
	}
}

/// Confirmations of a transaction mined at `mined_block` once they reach `depth` (at least 1).
///
/// The mined block itself counts as the first confirmation. A head behind the mined block, as
/// reported by a lagging node, has not confirmed anything yet.
pub(crate) fn confirmations_reached(head: u64, mined_block: u64, depth: u64) -> Option<u64> {
	let confirmations = head.checked_sub(mined_block)? + 1;
	(confirmations >= depth.max(1)).then_some(confirmations)
}

#[async_trait::async_trait]
impl RemoteWriter for RpcWriter {
	async fn send(
		&self,
		target: &ServiceTarget,
		from: &Address,
		request: &RequestDescriptor,
	) -> Result<SubmissionHandle, WriterError> {
		let payload = transaction_payload(target, from, request)?;
		debug!("Submitting {} to {}: {}", request.function, target, payload);

		let tx_hash = self.client.send_transaction(payload).await.map_err(|e| {
			if e.is_rejection() {
				WriterError::Rejected(e.to_string())
			} else {
				WriterError::Rpc(e)
			}
		})?;

		info!("Transaction {} accepted by the node", tx_hash);
		Ok(SubmissionHandle { tx_hash })
	}

	async fn await_confirmation(
		&self,
		handle: &SubmissionHandle,
		depth: u64,
	) -> Result<Confirmation, WriterError> {
		let client = &self.client;
		let tx_hash = handle.tx_hash.as_str();

		let block_number = retry(self.poll_backoff(), || async move {
			let receipt = client
				.transaction_receipt(tx_hash)
				.await
				.map_err(|e| backoff::Error::transient(WriterError::Rpc(e)))?;
			mined_block(tx_hash, receipt)
		})
		.await?;

		debug!("Transaction {} mined in block {}", handle.tx_hash, block_number);

		let confirmations = retry(self.poll_backoff(), || async move {
			let head = client
				.block_number()
				.await
				.map_err(|e| backoff::Error::transient(WriterError::Rpc(e)))?;
			confirmations_reached(head, block_number, depth).ok_or_else(|| {
				backoff::Error::transient(WriterError::NotMined(tx_hash.to_string()))
			})
		})
		.await?;

		info!(
			"Transaction {} confirmed in block {} ({} confirmations)",
			handle.tx_hash, block_number, confirmations
		);

		Ok(Confirmation {
			tx_hash: handle.tx_hash.clone(),
			block_number,
			confirmations,
		})
	}
}
