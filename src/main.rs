use raffle_state_sync::{
	chain::{Address, ChainSnapshot, RequestDescriptor},
	config::AppConfig,
	notify::TracingNotificationSink,
	registry::ServiceAddressRegistry,
	rpc::{JsonRpcClient, RpcReader, RpcWriter, WsEventChannel},
	sync::{ConnectionContext, SyncEngine, SyncState},
	transaction::{SequenceAllocator, TransactionCoordinator},
	utils::{NATIVE_TOKEN_DECIMALS, format_token_amount},
};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "raffle-sync", about = "Mirror and enter an on-chain raffle")]
struct Cli {
	/// TOML configuration file
	#[arg(long, short)]
	config: Option<PathBuf>,
	/// Override the HTTP JSON-RPC endpoint
	#[arg(long)]
	rpc_url: Option<String>,
	/// Override the websocket endpoint
	#[arg(long)]
	ws_url: Option<String>,
	/// Override the deployment registry file
	#[arg(long)]
	registry: Option<PathBuf>,
	/// Account to submit from
	#[arg(long)]
	account: Option<String>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Follow the raffle state until interrupted
	Watch,
	/// Enter the raffle once and wait for the outcome
	Enter,
}

fn render(snapshot: &ChainSnapshot) {
	info!(
		"Raffle State: {} | Entrance Fee: {} ETH | Number of players: {} | Recent Winner: {}",
		snapshot.phase,
		format_token_amount(&snapshot.entrance_fee, NATIVE_TOKEN_DECIMALS),
		snapshot.participant_count,
		snapshot.last_winner
	);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
				tracing_subscriber::EnvFilter::new("info,raffle_state_sync=debug")
			}),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run(Cli::parse()).await {
		error!("{}", e);
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
	let mut config = match &cli.config {
		Some(path) => AppConfig::load(path)?,
		None => AppConfig::default(),
	};
	if let Some(rpc_url) = cli.rpc_url {
		config.rpc_url = rpc_url;
	}
	if let Some(ws_url) = cli.ws_url {
		config.ws_url = ws_url;
	}
	if let Some(registry) = cli.registry {
		config.registry_path = registry;
	}
	if cli.account.is_some() {
		config.account = cli.account;
	}
	config.validate()?;

	let registry = ServiceAddressRegistry::load(&config.registry_path)?;
	let client = JsonRpcClient::new(config.rpc_url.clone(), config.request_timeout())?;
	let reader = Arc::new(RpcReader::new(client.clone()));
	let notifier = Arc::new(TracingNotificationSink);

	let network_id = client.chain_id().await?;
	info!("Connected to network {}", network_id);

	let account: Option<Address> = match &config.account {
		Some(account) => Some(account.parse()?),
		None => client
			.accounts()
			.await
			.unwrap_or_else(|e| {
				warn!("Could not list wallet accounts: {}", e);
				Vec::new()
			})
			.first()
			.and_then(|account| account.parse().ok()),
	};
	match &account {
		Some(account) => info!("Active account: {}", account),
		None => warn!("No active account, submissions are disabled"),
	}

	let engine = SyncEngine::new(
		reader.clone(),
		Arc::new(
			WsEventChannel::new(config.ws_url.clone())
				.with_handshake_timeout(config.request_timeout()),
		),
		registry,
		notifier.clone(),
		config.sync_config(),
	);
	engine.cache().subscribe(Box::new(render));

	let state = engine
		.update_context(ConnectionContext::connected(network_id, account))
		.await?;
	if state != SyncState::Subscribed {
		info!("No raffle address detected");
		return Ok(());
	}

	match cli.command {
		Command::Watch => {
			info!("Watching raffle state, press Ctrl-C to stop");
			tokio::signal::ctrl_c().await?;
		}
		Command::Enter => {
			let coordinator = TransactionCoordinator::new(
				engine.clone(),
				SequenceAllocator::new(reader),
				Arc::new(RpcWriter::new(client)),
				notifier,
				config.submission_config(),
			);
			let submitted = coordinator.submit(RequestDescriptor::enter_raffle()).await?;
			info!(
				"Entry {} sent with sequence {}, waiting for confirmation",
				submitted.tx_hash, submitted.sequence_number
			);
			match submitted.outcome().await {
				Ok(confirmation) => info!(
					"Entry confirmed in block {} ({} confirmations)",
					confirmation.block_number, confirmation.confirmations
				),
				Err(e) if e.is_indeterminate() => {
					warn!("Entry outcome unknown: {}", e);
					engine.refresh().await?;
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	engine.disconnect().await;
	Ok(())
}
