//! Interface to the external wallet SDK.
//!
//! Key derivation, transaction balancing and proving live in the SDK. The synchronizer only
//! needs to build or restore a wallet, start it, watch its state stream, serialize it and close
//! it.

use crate::config::NetworkId;
use crate::wallet::types::{SyncState, WalletSeed};
use futures::stream::BoxStream;

/// Opaque failure reported by the wallet SDK.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct WalletSdkError(pub String);

/// Endpoints and settings every wallet instance is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBuildParams {
	pub indexer_url: String,
	pub indexer_ws_url: String,
	pub proof_server_url: String,
	pub node_url: String,
	pub network_id: NetworkId,
	pub log_level: String,
}

/// A live wallet instance.
#[async_trait::async_trait]
pub trait Wallet: Send + Sync {
	/// Stream of state updates in emission order. Each call opens a new stream.
	fn state(&self) -> BoxStream<'static, SyncState>;

	/// Serialized wallet state. A JSON document with at least an `offset` field.
	async fn serialize_state(&self) -> Result<String, WalletSdkError>;

	/// Begin syncing against the indexer.
	async fn start(&self) -> Result<(), WalletSdkError>;

	/// Stop syncing and release resources.
	async fn close(&self) -> Result<(), WalletSdkError>;
}

/// Factory for wallet instances.
#[async_trait::async_trait]
pub trait WalletSdk: Send + Sync {
	/// New wallet derived from `seed`, syncing from genesis.
	async fn build(
		&self,
		params: &WalletBuildParams,
		seed: &WalletSeed,
	) -> Result<Box<dyn Wallet>, WalletSdkError>;

	/// Wallet restored from a previously serialized state.
	async fn restore(
		&self,
		params: &WalletBuildParams,
		serialized_state: &str,
	) -> Result<Box<dyn Wallet>, WalletSdkError>;
}
