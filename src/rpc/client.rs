//!
//! JSON-RPC client for the node hosting the raffle service.
//!
//! This module provides an async HTTP client for the standard `eth_*` methods the sync core
//! needs: contract calls, account nonces, transaction submission and receipt lookups. All
//! methods are async and designed for use with Tokio.

use super::types::*;
use crate::chain::Address;

use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC client over HTTP
#[derive(Clone)]
pub struct JsonRpcClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// The node's HTTP endpoint.
	rpc_url: String,
	/// Request id counter shared between clones.
	next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
	/// Create a new JSON-RPC client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint of the node.
	/// * `request_timeout` - Timeout applied to every HTTP request.
	///
	/// # Returns
	/// A new `JsonRpcClient`, or an `RpcError` if the HTTP client cannot be built.
	pub fn new(rpc_url: String, request_timeout: Duration) -> Result<Self, RpcError> {
		let http_client = Client::builder().timeout(request_timeout).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			next_id: Arc::new(AtomicU64::new(1)),
		})
	}

	/// Chain id of the connected network.
	pub async fn chain_id(&self) -> Result<u64, RpcError> {
		let result = self.execute_request("eth_chainId", json!([])).await?;
		parse_quantity(as_str(&result)?)
	}

	/// Latest block number.
	pub async fn block_number(&self) -> Result<u64, RpcError> {
		let result = self.execute_request("eth_blockNumber", json!([])).await?;
		parse_quantity(as_str(&result)?)
	}

	/// Accounts managed by the node's wallet, active account first.
	pub async fn accounts(&self) -> Result<Vec<String>, RpcError> {
		let result = self.execute_request("eth_accounts", json!([])).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Execute a read-only contract call against the latest block.
	///
	/// # Arguments
	/// * `to` - The contract address.
	/// * `data` - Hex encoded calldata.
	///
	/// # Returns
	/// The hex encoded return data.
	pub async fn call(&self, to: &Address, data: &str) -> Result<String, RpcError> {
		let result = self
			.execute_request(
				"eth_call",
				json!([{ "to": to.as_str(), "data": data }, "latest"]),
			)
			.await?;
		Ok(as_str(&result)?.to_string())
	}

	/// Number of transactions sent from `account`, as of the latest block.
	pub async fn transaction_count(&self, account: &Address) -> Result<u64, RpcError> {
		let result = self
			.execute_request(
				"eth_getTransactionCount",
				json!([account.as_str(), "latest"]),
			)
			.await?;
		parse_quantity(as_str(&result)?)
	}

	/// Submit a transaction for the node's wallet to sign and broadcast.
	///
	/// # Returns
	/// The transaction hash.
	pub async fn send_transaction(&self, transaction: serde_json::Value) -> Result<String, RpcError> {
		let result = self
			.execute_request("eth_sendTransaction", json!([transaction]))
			.await?;
		Ok(as_str(&result)?.to_string())
	}

	/// Receipt of a transaction, `None` while it is not mined.
	pub async fn transaction_receipt(
		&self,
		tx_hash: &str,
	) -> Result<Option<TransactionReceipt>, RpcError> {
		let result = self
			.execute_request("eth_getTransactionReceipt", json!([tx_hash]))
			.await?;
		if result.is_null() {
			return Ok(None);
		}
		Ok(Some(serde_json::from_value(result)?))
	}

	/// Execute a JSON-RPC request.
	///
	/// # Arguments
	/// * `method` - The RPC method name.
	/// * `params` - Positional parameters.
	///
	/// # Returns
	/// The `result` member of the response, or an `RpcError` if the request fails or the node
	/// answered with an error object.
	pub async fn execute_request(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, RpcError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params
		});

		debug!("RPC request {}: {}", id, method);

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(RpcError::ProtocolError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let mut response_json: serde_json::Value = response.json().await?;
		extract_result(&mut response_json)
	}
}

/// Pull the `result` out of a JSON-RPC response, mapping error objects to `RpcError::NodeError`.
pub(crate) fn extract_result(
	response: &mut serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
	if let Some(error) = response.get("error") {
		let error: JsonRpcErrorObject = serde_json::from_value(error.clone())?;
		return Err(RpcError::NodeError {
			code: error.code,
			message: error.message,
		});
	}

	response
		.get_mut("result")
		.map(serde_json::Value::take)
		.ok_or(RpcError::NoResult)
}

fn as_str(value: &serde_json::Value) -> Result<&str, RpcError> {
	value
		.as_str()
		.ok_or_else(|| RpcError::ProtocolError(format!("expected a string result, got {}", value)))
}
