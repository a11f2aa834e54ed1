use super::{JsonRpcClient, abi};
use crate::chain::{AccountReader, Address, ObservedField, ReadError, RemoteReader, ServiceTarget};

use tracing::debug;

/// How a getter's return word is decoded.
enum WordKind {
	Uint,
	Address,
}

/// Getter on the raffle contract backing each observed field.
fn getter(field: ObservedField) -> (&'static str, WordKind) {
	match field {
		ObservedField::EntranceFee => ("getEntranceFee()", WordKind::Uint),
		ObservedField::ParticipantCount => ("getNumberOfPlayers()", WordKind::Uint),
		ObservedField::LastWinner => ("getRecentWinner()", WordKind::Address),
		ObservedField::Phase => ("getRaffleState()", WordKind::Uint),
	}
}

/// `eth_call` backed reader for the observed fields and account nonces.
#[derive(Clone)]
pub struct RpcReader {
	client: JsonRpcClient,
}

impl RpcReader {
	pub fn new(client: JsonRpcClient) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl RemoteReader for RpcReader {
	async fn read(
		&self,
		target: &ServiceTarget,
		field: ObservedField,
	) -> Result<String, ReadError> {
		let (signature, kind) = getter(field);
		let data = self
			.client
			.call(&target.address, &abi::selector(signature))
			.await?;
		debug!("{} on {} returned {}", signature, target, data);

		match kind {
			WordKind::Uint => abi::decode_uint(&data),
			WordKind::Address => abi::decode_address(&data),
		}
		.map_err(|e| ReadError::Decode(format!("{}: {}", signature, e)))
	}
}

#[async_trait::async_trait]
impl AccountReader for RpcReader {
	async fn transaction_count(&self, account: &Address) -> Result<u64, ReadError> {
		Ok(self.client.transaction_count(account).await?)
	}
}
