//! Wallet construction and synchronization.
//!
//! The [`WalletSynchronizer`] turns configuration into a synced, funded wallet. It prefers
//! restoring the wallet from a snapshot saved by a previous run, and falls back to building a
//! fresh wallet from the seed whenever the snapshot is missing, unreadable, belongs to a chain
//! that has since been reset, or does not finish syncing in time. A bad snapshot only ever costs
//! a slower full sync.
//!
//! Phases, in order of a full run:
//!
//! `NoPersistedState | AttemptRestore -> RestoredAndSyncing -> [ChainResetDetected]`
//! `-> [RebuildFromScratch] -> Synced -> [FundsPending] -> Ready`
//!
//! Every wait is bounded by a deadline and resolves to a [`WaitOutcome`].

use crate::utils::format_token_amount;
use crate::wallet::WalletSyncError;
use crate::wallet::persistence::Persistence;
use crate::wallet::progress::ProgressLogger;
use crate::wallet::sdk::{Wallet, WalletBuildParams, WalletSdk, WalletSdkError};
use crate::wallet::snapshot::{SnapshotStore, read_offset};
use crate::wallet::types::{MIDNIGHT_TOKEN_DECIMALS, SyncState, WalletSeed};

use futures::StreamExt;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Step of the wallet construction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	NoPersistedState,
	AttemptRestore,
	RestoredAndSyncing,
	ChainResetDetected,
	RebuildFromScratch,
	Synced,
	FundsPending,
	Ready,
}

impl fmt::Display for SyncPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SyncPhase::NoPersistedState => "no persisted state",
			SyncPhase::AttemptRestore => "attempting restore",
			SyncPhase::RestoredAndSyncing => "restored, syncing",
			SyncPhase::ChainResetDetected => "chain reset detected",
			SyncPhase::RebuildFromScratch => "rebuilding from scratch",
			SyncPhase::Synced => "synced",
			SyncPhase::FundsPending => "waiting for funds",
			SyncPhase::Ready => "ready",
		};
		f.write_str(name)
	}
}

/// Result of a bounded wait on the wallet state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
	Ready(T),
	TimedOut,
	Failed(String),
}

/// How the wallet in a [`WalletHandle`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletSource {
	Restored,
	Fresh,
}

/// Settings for [`WalletSynchronizer`].
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
	pub build_params: WalletBuildParams,
	/// Seed for fresh wallets. A random seed is generated when absent, and no snapshot is
	/// looked up since it could not belong to the new wallet.
	pub seed: Option<WalletSeed>,
	/// Directory for wallet snapshots. Persistence is off when absent.
	pub cache_dir: Option<PathBuf>,
	/// Deadline for each wait on sync progress or full sync.
	pub sync_timeout: Duration,
	/// Deadline for a positive balance to show up.
	pub funding_timeout: Duration,
	/// Minimum time between progress log lines.
	pub progress_interval: Duration,
}

impl SynchronizerConfig {
	pub fn new(build_params: WalletBuildParams) -> Self {
		Self {
			build_params,
			seed: None,
			cache_dir: None,
			sync_timeout: Duration::from_secs(30 * 60),
			funding_timeout: Duration::from_secs(30 * 60),
			progress_interval: Duration::from_secs(10),
		}
	}
}

/// A synced wallet, owned by whoever called [`WalletSynchronizer::build_wallet`].
///
/// Must be released with [`WalletHandle::close`] or [`WalletSynchronizer::shutdown`].
pub struct WalletHandle {
	wallet: Box<dyn Wallet>,
	state: SyncState,
	source: WalletSource,
	seed: WalletSeed,
	snapshot_name: String,
	phases: Vec<SyncPhase>,
}

impl WalletHandle {
	pub fn wallet(&self) -> &dyn Wallet {
		self.wallet.as_ref()
	}

	/// State observed when the wallet became ready.
	pub fn state(&self) -> &SyncState {
		&self.state
	}

	pub fn source(&self) -> WalletSource {
		self.source
	}

	pub fn seed(&self) -> &WalletSeed {
		&self.seed
	}

	/// File name the wallet's snapshot is saved under.
	pub fn snapshot_name(&self) -> &str {
		&self.snapshot_name
	}

	/// Phases passed through while building this wallet.
	pub fn phases(&self) -> &[SyncPhase] {
		&self.phases
	}

	pub async fn close(self) -> Result<(), WalletSdkError> {
		self.wallet.close().await
	}
}

impl fmt::Debug for WalletHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WalletHandle")
			.field("state", &self.state)
			.field("source", &self.source)
			.field("snapshot_name", &self.snapshot_name)
			.finish()
	}
}

/// Builds wallets through the SDK, restoring from snapshots where possible.
pub struct WalletSynchronizer<S> {
	sdk: S,
	config: SynchronizerConfig,
	snapshots: Option<SnapshotStore>,
}

impl<S: WalletSdk> WalletSynchronizer<S> {
	pub fn new(sdk: S, config: SynchronizerConfig) -> Self {
		Self {
			sdk,
			config,
			snapshots: None,
		}
	}

	/// Enable snapshot restore and save. Has no effect without a configured cache directory.
	pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
		match &self.config.cache_dir {
			Some(dir) => self.snapshots = Some(SnapshotStore::new(persistence, dir.clone())),
			None => debug!("No cache directory configured, wallet snapshots disabled"),
		}
		self
	}

	pub fn sdk(&self) -> &S {
		&self.sdk
	}

	pub fn config(&self) -> &SynchronizerConfig {
		&self.config
	}

	fn snapshot_name(&self, seed: &WalletSeed) -> String {
		format!("{}-{}.state", seed.prefix(), self.config.build_params.network_id)
	}

	fn enter(&self, phases: &mut Vec<SyncPhase>, phase: SyncPhase) {
		info!("Wallet: {}", phase);
		phases.push(phase);
	}

	/// Produce a synced wallet with a positive native balance.
	///
	/// Snapshot problems never fail this call; they route to a fresh build. Errors are returned
	/// for SDK failures during the fresh build, a fresh wallet that does not sync in time, and
	/// funds that do not arrive in time.
	pub async fn build_wallet(&self) -> Result<WalletHandle, WalletSyncError> {
		let mut phases = Vec::new();

		let restored = match &self.config.seed {
			Some(seed) => {
				let name = self.snapshot_name(seed);
				self.try_restore(&name, &mut phases)
					.await
					.map(|(wallet, state)| (seed.clone(), wallet, state))
			}
			None => {
				self.enter(&mut phases, SyncPhase::NoPersistedState);
				None
			}
		};

		let (seed, wallet, state, source) = match restored {
			Some((seed, wallet, state)) => (seed, wallet, state, WalletSource::Restored),
			None => {
				let seed = match &self.config.seed {
					Some(seed) => seed.clone(),
					None => {
						warn!("No wallet seed configured, building a wallet from a random seed");
						WalletSeed::random()
					}
				};
				let (wallet, state) = self.build_fresh(&seed, &mut phases).await?;
				(seed, wallet, state, WalletSource::Fresh)
			}
		};
		self.enter(&mut phases, SyncPhase::Synced);

		let state = match self.wait_for_funds(wallet.as_ref(), state, &mut phases).await {
			Ok(state) => state,
			Err(e) => {
				close_quietly(wallet.as_ref()).await;
				return Err(e);
			}
		};
		self.enter(&mut phases, SyncPhase::Ready);

		Ok(WalletHandle {
			wallet,
			state,
			source,
			snapshot_name: self.snapshot_name(&seed),
			seed,
			phases,
		})
	}

	/// Restore from the snapshot named `name`. `None` means: build from scratch.
	async fn try_restore(
		&self,
		name: &str,
		phases: &mut Vec<SyncPhase>,
	) -> Option<(Box<dyn Wallet>, SyncState)> {
		let Some(store) = &self.snapshots else {
			self.enter(phases, SyncPhase::NoPersistedState);
			return None;
		};
		if !store.exists(name).await {
			self.enter(phases, SyncPhase::NoPersistedState);
			return None;
		}

		self.enter(phases, SyncPhase::AttemptRestore);
		let snapshot = match store.load(name).await {
			Ok(Some(snapshot)) => snapshot,
			Ok(None) => return None,
			Err(e) => {
				warn!("Wallet snapshot {} is unreadable, rebuilding: {}", name, e);
				return None;
			}
		};

		let wallet = match self
			.sdk
			.restore(&self.config.build_params, &snapshot.serialized_state)
			.await
		{
			Ok(wallet) => wallet,
			Err(e) => {
				warn!("Failed to restore wallet from snapshot, rebuilding: {}", e);
				return None;
			}
		};
		if let Err(e) = wallet.start().await {
			warn!("Failed to start restored wallet, rebuilding: {}", e);
			close_quietly(wallet.as_ref()).await;
			return None;
		}
		self.enter(phases, SyncPhase::RestoredAndSyncing);

		match self.is_another_chain(wallet.as_ref(), snapshot.offset).await {
			Ok(false) => {}
			Ok(true) => {
				self.enter(phases, SyncPhase::ChainResetDetected);
				close_quietly(wallet.as_ref()).await;
				return None;
			}
			Err(reason) => {
				warn!(
					"Could not compare restored wallet with the chain, rebuilding: {}",
					reason
				);
				close_quietly(wallet.as_ref()).await;
				return None;
			}
		}

		match self.wait_for_sync(wallet.as_ref()).await {
			WaitOutcome::Ready(state) => Some((wallet, state)),
			WaitOutcome::TimedOut => {
				warn!(
					"Restored wallet did not sync within {:?}, rebuilding",
					self.config.sync_timeout
				);
				close_quietly(wallet.as_ref()).await;
				None
			}
			WaitOutcome::Failed(reason) => {
				warn!("Restored wallet failed to sync, rebuilding: {}", reason);
				close_quietly(wallet.as_ref()).await;
				None
			}
		}
	}

	/// Whether the chain was reset since the snapshot at `persisted_offset` was taken.
	///
	/// After the first progress report the wallet's own offset is compared with the snapshot's.
	/// The chain counts as reset when `live_offset < persisted_offset - 1`.
	async fn is_another_chain(
		&self,
		wallet: &dyn Wallet,
		persisted_offset: u64,
	) -> Result<bool, String> {
		match self.wait_for_sync_progress(wallet).await {
			WaitOutcome::Ready(_) => {}
			WaitOutcome::TimedOut => {
				return Err(format!(
					"no sync progress within {:?}",
					self.config.sync_timeout
				));
			}
			WaitOutcome::Failed(reason) => return Err(reason),
		}

		let serialized = wallet.serialize_state().await.map_err(|e| e.to_string())?;
		let live_offset = read_offset(&serialized).map_err(|e| e.to_string())?;

		if live_offset.saturating_add(1) < persisted_offset {
			info!(
				"Wallet offset {} is behind restored offset {}, the chain was reset",
				live_offset, persisted_offset
			);
			Ok(true)
		} else {
			debug!(
				"Wallet offset {} matches restored offset {}",
				live_offset, persisted_offset
			);
			Ok(false)
		}
	}

	async fn build_fresh(
		&self,
		seed: &WalletSeed,
		phases: &mut Vec<SyncPhase>,
	) -> Result<(Box<dyn Wallet>, SyncState), WalletSyncError> {
		self.enter(phases, SyncPhase::RebuildFromScratch);

		let wallet = self.sdk.build(&self.config.build_params, seed).await?;
		if let Err(e) = wallet.start().await {
			close_quietly(wallet.as_ref()).await;
			return Err(e.into());
		}

		match self.wait_for_sync(wallet.as_ref()).await {
			WaitOutcome::Ready(state) => Ok((wallet, state)),
			WaitOutcome::TimedOut => {
				close_quietly(wallet.as_ref()).await;
				Err(WalletSyncError::SyncTimeout(self.config.sync_timeout))
			}
			WaitOutcome::Failed(reason) => {
				close_quietly(wallet.as_ref()).await;
				Err(WalletSyncError::StateStreamEnded(reason))
			}
		}
	}

	/// Wait for the first state carrying sync progress.
	pub async fn wait_for_sync_progress(&self, wallet: &dyn Wallet) -> WaitOutcome<SyncState> {
		let mut logger = ProgressLogger::new(self.config.progress_interval);
		wait_for_state(wallet, self.config.sync_timeout, |state| {
			logger.log_sync(state);
			state.progress.is_some()
		})
		.await
	}

	/// Wait until the wallet reports it is fully synced.
	pub async fn wait_for_sync(&self, wallet: &dyn Wallet) -> WaitOutcome<SyncState> {
		let mut logger = ProgressLogger::new(self.config.progress_interval);
		wait_for_state(wallet, self.config.sync_timeout, |state| {
			logger.log_sync(state);
			state.is_fully_synced()
		})
		.await
	}

	async fn wait_for_funds(
		&self,
		wallet: &dyn Wallet,
		synced: SyncState,
		phases: &mut Vec<SyncPhase>,
	) -> Result<SyncState, WalletSyncError> {
		if synced.native_balance() > 0 {
			info!(
				"Wallet balance: {} tDUST",
				format_token_amount(synced.native_balance(), MIDNIGHT_TOKEN_DECIMALS)
			);
			return Ok(synced);
		}

		self.enter(phases, SyncPhase::FundsPending);
		info!("Waiting to receive tokens at {}", synced.address);

		let mut logger = ProgressLogger::new(self.config.progress_interval);
		let outcome = wait_for_state(wallet, self.config.funding_timeout, |state| {
			if !state.is_fully_synced() {
				return false;
			}
			logger.log_funds(state);
			state.native_balance() > 0
		})
		.await;

		match outcome {
			WaitOutcome::Ready(state) => {
				info!(
					"Received funds, balance: {} tDUST",
					format_token_amount(state.native_balance(), MIDNIGHT_TOKEN_DECIMALS)
				);
				Ok(state)
			}
			WaitOutcome::TimedOut => {
				Err(WalletSyncError::FundingTimeout(self.config.funding_timeout))
			}
			WaitOutcome::Failed(reason) => Err(WalletSyncError::StateStreamEnded(reason)),
		}
	}

	/// Save the wallet's serialized state as a snapshot.
	///
	/// Failures are logged and swallowed so they never block shutdown. Returns the snapshot path
	/// when one was written.
	pub async fn save_state(&self, handle: &WalletHandle) -> Option<PathBuf> {
		let Some(store) = &self.snapshots else {
			debug!("Wallet snapshots disabled, not saving state");
			return None;
		};

		let serialized = match handle.wallet.serialize_state().await {
			Ok(serialized) => serialized,
			Err(e) => {
				error!("Failed to serialize wallet state: {}", e);
				return None;
			}
		};

		match store.save(handle.snapshot_name(), &serialized).await {
			Ok(path) => Some(path),
			Err(e) => {
				error!("Failed to save wallet snapshot: {}", e);
				None
			}
		}
	}

	/// Save a snapshot, then close the wallet. Never fails.
	pub async fn shutdown(&self, handle: WalletHandle) {
		self.save_state(&handle).await;
		if let Err(e) = handle.close().await {
			error!("Failed to close wallet: {}", e);
		}
	}
}

/// Consume the wallet's state stream until `accept` matches or `timeout` elapses.
async fn wait_for_state<F>(
	wallet: &dyn Wallet,
	timeout: Duration,
	mut accept: F,
) -> WaitOutcome<SyncState>
where
	F: FnMut(&SyncState) -> bool,
{
	let mut states = wallet.state();
	let wait = async {
		while let Some(state) = states.next().await {
			if accept(&state) {
				return WaitOutcome::Ready(state);
			}
		}
		WaitOutcome::Failed("wallet state stream ended".to_string())
	};

	match tokio::time::timeout(timeout, wait).await {
		Ok(outcome) => outcome,
		Err(_) => WaitOutcome::TimedOut,
	}
}

async fn close_quietly(wallet: &dyn Wallet) {
	if let Err(e) = wallet.close().await {
		warn!("Failed to close wallet: {}", e);
	}
}
