use crate::sync::{SyncConfig, WatchedEvent};
use crate::transaction::SubmissionConfig;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("unable to parse config: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid config: {0}")]
	Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
	/// HTTP JSON-RPC endpoint of the node.
	pub rpc_url: String,
	/// Websocket endpoint used for event subscriptions.
	pub ws_url: String,
	/// JSON file mapping network ids to deployed raffle addresses.
	pub registry_path: PathBuf,
	/// Account to submit from; the node's first wallet account when unset.
	pub account: Option<String>,
	pub confirmations: u64,
	pub confirmation_timeout_secs: u64,
	pub request_timeout_secs: u64,
	/// Periodic refresh in addition to event-triggered ones.
	pub poll_interval_secs: Option<u64>,
	pub watched_event: String,
	/// Notification text for the watched event; derived from its name when unset.
	pub watched_event_title: Option<String>,
	pub watched_event_message: Option<String>,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			rpc_url: "http://127.0.0.1:8545".to_string(),
			ws_url: "ws://127.0.0.1:8545".to_string(),
			registry_path: PathBuf::from("./constants/contractAddresses.json"),
			account: None,
			confirmations: 1,
			confirmation_timeout_secs: 120,
			request_timeout_secs: 30,
			poll_interval_secs: None,
			watched_event: "RequestedRaffleWinner(uint256)".to_string(),
			watched_event_title: None,
			watched_event_message: None,
		}
	}
}

impl AppConfig {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path)?;
		let config: Self = toml::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.confirmations == 0 {
			return Err(ConfigError::Invalid(
				"confirmations must be at least 1".to_string(),
			));
		}
		if self.poll_interval_secs == Some(0) {
			return Err(ConfigError::Invalid(
				"poll_interval_secs must be positive".to_string(),
			));
		}
		if !self.watched_event.contains('(') {
			return Err(ConfigError::Invalid(format!(
				"watched_event must be a full event signature, got {}",
				self.watched_event
			)));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn sync_config(&self) -> SyncConfig {
		let mut watched_event = WatchedEvent::for_signature(self.watched_event.clone());
		if let Some(title) = &self.watched_event_title {
			watched_event.title = title.clone();
		}
		if let Some(message) = &self.watched_event_message {
			watched_event.message = message.clone();
		}
		SyncConfig {
			watched_event,
			poll_interval: self.poll_interval_secs.map(Duration::from_secs),
		}
	}

	pub fn submission_config(&self) -> SubmissionConfig {
		SubmissionConfig {
			confirmations: self.confirmations,
			confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
		}
	}
}
