//! Wallet construction, restore and synchronization on top of the external wallet SDK.

pub mod persistence;
pub mod progress;
pub mod sdk;
pub mod snapshot;
pub mod synchronizer;
pub mod types;

pub use persistence::{FsPersistence, Persistence};
pub use progress::ProgressLogger;
pub use sdk::{Wallet, WalletBuildParams, WalletSdk, WalletSdkError};
pub use snapshot::{PersistedWalletSnapshot, SnapshotStore};
pub use synchronizer::{
	SyncPhase, SynchronizerConfig, WaitOutcome, WalletHandle, WalletSource, WalletSynchronizer,
};
pub use types::*;
