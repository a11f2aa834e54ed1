//! JSON-RPC binding of the remote service
//!
//! This module provides the HTTP client, the websocket event channel, and the reader and writer
//! implementations the sync core uses to talk to an EVM node hosting the raffle contract.

/// ABI selectors, topics and return word decoding
pub mod abi;
/// JSON-RPC client over HTTP
mod client;
/// Contract getters and account nonces
mod reader;
/// Websocket log subscriptions
mod subscription;
/// Type definitions for RPC payloads
mod types;
/// Transaction submission and confirmation tracking
mod writer;

pub use client::JsonRpcClient;
pub use reader::RpcReader;
pub use subscription::WsEventChannel;
pub use types::*;
pub use writer::RpcWriter;
