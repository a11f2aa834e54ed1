//! Deployment registry mapping a network id to the addresses the raffle service is deployed at.
//!
//! The registry is loaded from a JSON document shaped like `{"31337": ["0x..."]}`. Lists are
//! ordered; the first address is the active deployment.

use crate::chain::{Address, AddressError};

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Invalid network id: {0}")]
	InvalidNetworkId(String),

	#[error(transparent)]
	InvalidAddress(#[from] AddressError),
}

/// Result of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
	Deployed(Address),
	NotDeployed,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceAddressRegistry {
	deployments: HashMap<u64, Vec<Address>>,
}

impl ServiceAddressRegistry {
	pub fn new(deployments: HashMap<u64, Vec<Address>>) -> Self {
		Self { deployments }
	}

	pub fn from_json(json: &str) -> Result<Self, RegistryError> {
		let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
		let mut deployments = HashMap::with_capacity(raw.len());
		for (network, addresses) in raw {
			let network_id = network
				.trim()
				.parse::<u64>()
				.map_err(|_| RegistryError::InvalidNetworkId(network.clone()))?;
			let addresses = addresses
				.iter()
				.map(|address| address.parse::<Address>())
				.collect::<Result<Vec<_>, _>>()?;
			deployments.insert(network_id, addresses);
		}
		Ok(Self { deployments })
	}

	pub fn load(path: &Path) -> Result<Self, RegistryError> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	pub fn lookup(&self, network_id: u64) -> Deployment {
		match self
			.deployments
			.get(&network_id)
			.and_then(|addresses| addresses.first())
		{
			Some(address) => Deployment::Deployed(address.clone()),
			None => Deployment::NotDeployed,
		}
	}

	/// All known deployments for a network, newest first as listed in the source document.
	pub fn deployments(&self, network_id: u64) -> &[Address] {
		self.deployments
			.get(&network_id)
			.map(Vec::as_slice)
			.unwrap_or_default()
	}
}
