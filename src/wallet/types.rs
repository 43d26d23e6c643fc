use crate::wallet::sdk::WalletSdkError;

use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;

/// Number of decimal places for the Midnight native token (tDUST).
pub const MIDNIGHT_TOKEN_DECIMALS: u32 = 6;

/// Token type identifier of the native token.
pub const NATIVE_TOKEN: &str = "02000000000000000000000000000000000000000000000000000000000000000000";

/// How far the wallet is behind the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
	/// Blocks received from the indexer but not yet applied locally.
	pub applied_lag: u64,
	/// Blocks the indexer has that the wallet has not received.
	pub source_lag: u64,
	/// The wallet has caught up with the chain tip.
	pub synced: bool,
}

/// One update of the wallet state stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
	/// Absent until the wallet has heard from the indexer at least once.
	pub progress: Option<SyncProgress>,
	/// Balance per token type.
	pub balances: BTreeMap<String, u128>,
	pub transaction_count: usize,
	pub address: String,
}

impl SyncState {
	pub fn is_fully_synced(&self) -> bool {
		self.progress.map(|p| p.synced).unwrap_or(false)
	}

	pub fn native_balance(&self) -> u128 {
		self.balances.get(NATIVE_TOKEN).copied().unwrap_or(0)
	}
}

/// Hex-encoded 32-byte wallet seed.
#[derive(Clone, PartialEq, Eq)]
pub struct WalletSeed(String);

impl WalletSeed {
	/// Fresh random seed.
	pub fn random() -> Self {
		let mut seed = [0u8; 32];
		rand::rng().fill(&mut seed);
		Self(hex::encode(seed))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Short non-secret prefix, used to name files.
	pub fn prefix(&self) -> String {
		self.0.chars().take(7).collect()
	}
}

impl std::str::FromStr for WalletSeed {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let bytes = hex::decode(trimmed).map_err(|e| format!("seed is not hex: {}", e))?;
		if bytes.len() != 32 {
			return Err(format!("seed must be 32 bytes, got {}", bytes.len()));
		}
		Ok(Self(trimmed.to_lowercase()))
	}
}

impl fmt::Debug for WalletSeed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WalletSeed({}…)", self.prefix())
	}
}

/// Error types for wallet construction and synchronization
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Wallet SDK error: {0}")]
	SdkError(#[from] WalletSdkError),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Wallet state parse error: {0}")]
	ParseError(String),

	#[error("Wallet did not sync within {0:?}")]
	SyncTimeout(std::time::Duration),

	#[error("No funds arrived within {0:?}")]
	FundingTimeout(std::time::Duration),

	#[error("Wallet state stream ended: {0}")]
	StateStreamEnded(String),
}
