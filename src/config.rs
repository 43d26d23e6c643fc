//! Environment configuration.
//!
//! Endpoints come from a network preset (`MIDNIGHT_NETWORK`) and can be overridden one by one.
//! Without a preset every endpoint must be set explicitly. A `.env` file in the working
//! directory is honored.

use crate::retry::RetryPolicy;
use crate::wallet::{SynchronizerConfig, WalletBuildParams, WalletSeed};

use reqwest::Url;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Network the ledger and wallet SDK address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkId {
	Undeployed,
	DevNet,
	TestNet,
	MainNet,
}

impl fmt::Display for NetworkId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			NetworkId::Undeployed => "undeployed",
			NetworkId::DevNet => "devnet",
			NetworkId::TestNet => "testnet",
			NetworkId::MainNet => "mainnet",
		};
		f.write_str(name)
	}
}

impl FromStr for NetworkId {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"undeployed" => Ok(NetworkId::Undeployed),
			"devnet" => Ok(NetworkId::DevNet),
			"testnet" => Ok(NetworkId::TestNet),
			"mainnet" => Ok(NetworkId::MainNet),
			other => Err(ConfigError::InvalidValue {
				key: "MIDNIGHT_NETWORK_ID",
				reason: format!("unknown network id {:?}", other),
			}),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing required setting {0}")]
	Missing(&'static str),

	#[error("Invalid URL in {key}: {reason}")]
	InvalidUrl { key: &'static str, reason: String },

	#[error("Invalid value for {key}: {reason}")]
	InvalidValue { key: &'static str, reason: String },

	#[error("Invalid wallet seed: {0}")]
	InvalidSeed(String),
}

/// Default endpoints for a known deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPreset {
	Standalone,
	TestnetLocal,
	TestnetRemote,
}

struct PresetEndpoints {
	indexer_url: &'static str,
	indexer_ws_url: &'static str,
	node_url: &'static str,
	proof_server_url: &'static str,
	network_id: NetworkId,
}

const LOCAL_INDEXER: &str = "http://127.0.0.1:8088/api/v1/graphql";
const LOCAL_INDEXER_WS: &str = "ws://127.0.0.1:8088/api/v1/graphql/ws";
const LOCAL_NODE: &str = "http://127.0.0.1:9944";
const LOCAL_PROOF_SERVER: &str = "http://127.0.0.1:6300";

impl NetworkPreset {
	fn endpoints(self) -> PresetEndpoints {
		match self {
			NetworkPreset::Standalone => PresetEndpoints {
				indexer_url: LOCAL_INDEXER,
				indexer_ws_url: LOCAL_INDEXER_WS,
				node_url: LOCAL_NODE,
				proof_server_url: LOCAL_PROOF_SERVER,
				network_id: NetworkId::Undeployed,
			},
			NetworkPreset::TestnetLocal => PresetEndpoints {
				indexer_url: LOCAL_INDEXER,
				indexer_ws_url: LOCAL_INDEXER_WS,
				node_url: LOCAL_NODE,
				proof_server_url: LOCAL_PROOF_SERVER,
				network_id: NetworkId::TestNet,
			},
			NetworkPreset::TestnetRemote => PresetEndpoints {
				indexer_url: "https://indexer.testnet-02.midnight.network/api/v1/graphql",
				indexer_ws_url: "wss://indexer.testnet-02.midnight.network/api/v1/graphql/ws",
				node_url: "https://rpc.testnet-02.midnight.network",
				proof_server_url: LOCAL_PROOF_SERVER,
				network_id: NetworkId::TestNet,
			},
		}
	}
}

impl FromStr for NetworkPreset {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"standalone" => Ok(NetworkPreset::Standalone),
			"testnet-local" => Ok(NetworkPreset::TestnetLocal),
			"testnet-remote" | "testnet" => Ok(NetworkPreset::TestnetRemote),
			other => Err(ConfigError::InvalidValue {
				key: "MIDNIGHT_NETWORK",
				reason: format!("unknown network preset {:?}", other),
			}),
		}
	}
}

/// Everything the client layer needs to reach a Midnight deployment.
#[derive(Debug, Clone)]
pub struct AppConfig {
	pub indexer_url: Url,
	pub indexer_ws_url: Url,
	pub node_url: Url,
	pub proof_server_url: Url,
	pub network_id: NetworkId,
	/// Base URL of the circuit artifacts. Defaults to the proof server.
	pub zk_config_url: Url,
	pub cache_dir: Option<PathBuf>,
	pub wallet_seed: Option<WalletSeed>,
	pub sync_timeout: Duration,
	pub funding_timeout: Duration,
	/// Policy for every indexer call except transaction watches.
	pub retry_policy: RetryPolicy,
	/// Policy for transaction watches. Keeps the one second delay floor.
	pub tx_watch_policy: RetryPolicy,
}

impl AppConfig {
	/// Load configuration from `.env` and the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		// A missing .env file is fine
		let _ = dotenvy::dotenv();
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Load configuration through an arbitrary key lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| {
			lookup(key)
				.map(|v| v.trim().to_string())
				.filter(|v| !v.is_empty())
		};

		let preset = get("MIDNIGHT_NETWORK")
			.map(|name| name.parse::<NetworkPreset>())
			.transpose()?
			.map(NetworkPreset::endpoints);

		let endpoint = |key: &'static str, preset_value: Option<&'static str>| {
			let raw = get(key)
				.or_else(|| preset_value.map(str::to_string))
				.ok_or(ConfigError::Missing(key))?;
			parse_url(key, &raw)
		};

		let indexer_url = endpoint(
			"MIDNIGHT_INDEXER_URL",
			preset.as_ref().map(|p| p.indexer_url),
		)?;
		let indexer_ws_url = endpoint(
			"MIDNIGHT_INDEXER_WS_URL",
			preset.as_ref().map(|p| p.indexer_ws_url),
		)?;
		let node_url = endpoint("MIDNIGHT_NODE_URL", preset.as_ref().map(|p| p.node_url))?;
		let proof_server_url = endpoint(
			"MIDNIGHT_PROOF_SERVER_URL",
			preset.as_ref().map(|p| p.proof_server_url),
		)?;

		let network_id = match get("MIDNIGHT_NETWORK_ID") {
			Some(id) => id.parse()?,
			None => preset
				.as_ref()
				.map(|p| p.network_id)
				.ok_or(ConfigError::Missing("MIDNIGHT_NETWORK_ID"))?,
		};

		let zk_config_url = match get("MIDNIGHT_ZK_CONFIG_URL") {
			Some(raw) => parse_url("MIDNIGHT_ZK_CONFIG_URL", &raw)?,
			None => proof_server_url.clone(),
		};

		let wallet_seed = get("MIDNIGHT_WALLET_SEED")
			.map(|raw| raw.parse::<WalletSeed>().map_err(ConfigError::InvalidSeed))
			.transpose()?;

		let sync_timeout =
			Duration::from_secs(parse_number(&get, "MIDNIGHT_SYNC_TIMEOUT_SECS", 1800)?);
		let funding_timeout =
			Duration::from_secs(parse_number(&get, "MIDNIGHT_FUNDING_TIMEOUT_SECS", 1800)?);

		let defaults = RetryPolicy::default();
		let max_attempts =
			parse_number(&get, "MIDNIGHT_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?;

		Ok(Self {
			indexer_url,
			indexer_ws_url,
			node_url,
			proof_server_url,
			network_id,
			zk_config_url,
			cache_dir: get("MIDNIGHT_CACHE_DIR").map(PathBuf::from),
			wallet_seed,
			sync_timeout,
			funding_timeout,
			retry_policy: defaults.with_max_attempts(max_attempts),
			tx_watch_policy: RetryPolicy::transaction_watch().with_max_attempts(max_attempts),
		})
	}

	pub fn wallet_build_params(&self) -> WalletBuildParams {
		WalletBuildParams {
			indexer_url: self.indexer_url.to_string(),
			indexer_ws_url: self.indexer_ws_url.to_string(),
			proof_server_url: self.proof_server_url.to_string(),
			node_url: self.node_url.to_string(),
			network_id: self.network_id,
			log_level: "warn".to_string(),
		}
	}

	pub fn synchronizer_config(&self) -> SynchronizerConfig {
		SynchronizerConfig {
			seed: self.wallet_seed.clone(),
			cache_dir: self.cache_dir.clone(),
			sync_timeout: self.sync_timeout,
			funding_timeout: self.funding_timeout,
			..SynchronizerConfig::new(self.wallet_build_params())
		}
	}
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
		key,
		reason: format!("{:?}: {}", raw, e),
	})
}

fn parse_number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: fmt::Display,
	G: Fn(&str) -> Option<String>,
{
	match get(key) {
		Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
			key,
			reason: format!("{:?}: {}", raw, e),
		}),
		None => Ok(default),
	}
}
