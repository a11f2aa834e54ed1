//! Types for the JSON-RPC binding of the remote service

use serde::{Deserialize, Serialize};

/// Transaction receipt as returned by `eth_getTransactionReceipt`.
///
/// Quantities are kept as the hex strings the node sends; use [`parse_quantity`] to read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// The transaction hash.
    pub transaction_hash: String,
    /// Block the transaction was mined in. Absent while pending on some nodes.
    pub block_number: Option<String>,
    /// `0x1` on success, `0x0` when execution reverted.
    pub status: Option<String>,
    /// Gas used by the transaction.
    pub gas_used: Option<String>,
}

impl TransactionReceipt {
    /// Whether execution succeeded. Pre-byzantium receipts carry no status and count as success.
    pub fn succeeded(&self) -> bool {
        match self.status.as_deref() {
            Some(status) => parse_quantity(status).map(|s| s == 1).unwrap_or(false),
            None => true,
        }
    }

    pub fn mined_block(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|block| parse_quantity(block).ok())
    }
}

/// Log entry delivered by a `logs` subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Emitting contract.
    pub address: String,
    /// Indexed topics; the first one is the event signature hash.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Non-indexed data as hex.
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    /// Set when the log was removed by a chain reorganisation.
    #[serde(default)]
    pub removed: bool,
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Parse a JSON-RPC hex quantity (`0x1a`) into an integer.
pub fn parse_quantity(value: &str) -> Result<u64, RpcError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::InvalidQuantity(value.to_string()))?;
    if digits.is_empty() {
        return Err(RpcError::InvalidQuantity(value.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| RpcError::InvalidQuantity(value.to_string()))
}

/// Encode an integer as a JSON-RPC hex quantity.
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Error types for JSON-RPC and websocket operations
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Node error {code}: {message}")]
    NodeError { code: i64, message: String },

    #[error("No result returned")]
    NoResult,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl RpcError {
    /// Whether the node refused the request itself, as opposed to a transport failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RpcError::NodeError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("7a69").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_receipt_status() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x0"
        }))
        .unwrap();
        assert!(!receipt.succeeded());
        assert_eq!(receipt.mined_block(), Some(16));

        let legacy: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0xabc",
            "blockNumber": null
        }))
        .unwrap();
        assert!(legacy.succeeded());
        assert_eq!(legacy.mined_block(), None);
    }
}
