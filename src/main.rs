use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use midnight_dapp_client::indexer::{
	BlockOffset, ContractAddress, ContractStateObservableConfig, IndexerError,
	IndexerPublicDataProvider, MidnightIndexerClient, PublicDataProvider,
	ResilientPublicDataProvider,
};
use midnight_dapp_client::zk_config::{
	CachedZkConfigProvider, CircuitId, HttpZkConfigProvider, ZkConfigError, ZkConfigProvider,
};
use midnight_dapp_client::{AppConfig, ConfigError, ProviderCallback, ProviderCallbackEvent};

#[derive(Parser)]
#[command(
	name = "midnight-dapp",
	about = "Query a Midnight deployment through the resilient client layer"
)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Print the current state of a contract.
	ContractState {
		address: ContractAddress,
		/// Read the state as of this block height.
		#[arg(long)]
		height: Option<u64>,
	},
	/// Print the state a contract was deployed with.
	DeployState { address: ContractAddress },
	/// Follow state changes of a contract.
	WatchContract {
		address: ContractAddress,
		/// Replay every state since deployment first.
		#[arg(long)]
		all: bool,
	},
	/// Wait until a transaction is finalized.
	WatchTx { tx_id: String },
	/// Download prover keys, verifier keys and ZKIR for circuits.
	FetchKeys {
		#[arg(required = true)]
		circuits: Vec<String>,
	},
}

#[derive(Debug, thiserror::Error)]
enum CliError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Indexer(#[from] IndexerError),

	#[error(transparent)]
	ZkConfig(#[from] ZkConfigError),

	#[error("Contract {0} has no state")]
	NoState(ContractAddress),
}

fn logging_callback() -> ProviderCallback {
	Arc::new(|event: ProviderCallbackEvent| info!("Provider event: {}", event))
}

async fn run(command: Command, config: AppConfig) -> Result<(), CliError> {
	let client = MidnightIndexerClient::new(
		config.indexer_url.to_string(),
		config.indexer_ws_url.to_string(),
	)?;
	let provider = ResilientPublicDataProvider::new(IndexerPublicDataProvider::new(client))
		.with_policy(config.retry_policy)
		.with_tx_watch_policy(config.tx_watch_policy)
		.with_callback(logging_callback());

	match command {
		Command::ContractState { address, height } => {
			let offset = height.map(BlockOffset::Height);
			let state = provider
				.query_contract_state(&address, offset.as_ref())
				.await?
				.ok_or_else(|| CliError::NoState(address.clone()))?;
			println!("{}", state.0);
		}
		Command::DeployState { address } => {
			let state = provider
				.query_deploy_contract_state(&address)
				.await?
				.ok_or_else(|| CliError::NoState(address.clone()))?;
			println!("{}", state.0);
		}
		Command::WatchContract { address, all } => {
			let from = if all {
				ContractStateObservableConfig::All
			} else {
				ContractStateObservableConfig::Latest
			};
			let mut states = provider.contract_state_observable(&address, &from).await?;
			while let Some(state) = states.next().await {
				println!("{}", state?.0);
			}
			info!("Contract state subscription for {} ended", address);
		}
		Command::WatchTx { tx_id } => {
			let tx = provider.watch_for_tx_data(&tx_id).await?;
			info!(
				"Transaction {} included in block {} ({:?})",
				tx.hash, tx.block.height, tx.apply_stage
			);
			println!("{}", tx.block.hash);
		}
		Command::FetchKeys { circuits } => {
			let zk_config = CachedZkConfigProvider::new(HttpZkConfigProvider::new(
				config.zk_config_url.as_str(),
			)?)
			.with_callback(logging_callback());
			for circuit in circuits.into_iter().map(CircuitId::new) {
				let artifacts = zk_config.get(&circuit).await?;
				println!(
					"{}: prover key {} bytes, verifier key {} bytes, zkir {} bytes",
					circuit,
					artifacts.prover_key.len(),
					artifacts.verifier_key.len(),
					artifacts.zkir.len()
				);
			}
		}
	}
	Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();

	let config = match AppConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};
	info!(
		"Using indexer {} on network {}",
		config.indexer_url, config.network_id
	);

	match run(cli.command, config).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}
