//! Wallet snapshot storage.
//!
//! A snapshot is the wallet SDK's serialized state, written to `<dir>/<name>` when the process
//! shuts down and read back on the next start. The block offset the wallet had reached is read
//! from the `offset` field of the serialized JSON. A metadata sidecar `<name>.meta.json` records
//! when the snapshot was taken.

use crate::wallet::WalletSyncError;
use crate::wallet::persistence::Persistence;

use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A parsed snapshot: the opaque serialized state and the offset it was taken at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedWalletSnapshot {
	pub serialized_state: String,
	pub offset: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OffsetValue {
	Number(u64),
	Text(String),
}

#[derive(Deserialize)]
struct OffsetProbe {
	offset: OffsetValue,
}

/// Block offset recorded in a serialized wallet state.
pub fn read_offset(serialized_state: &str) -> Result<u64, WalletSyncError> {
	let probe: OffsetProbe = serde_json::from_str(serialized_state).map_err(|e| {
		WalletSyncError::ParseError(format!("Failed to read offset from wallet state: {}", e))
	})?;
	match probe.offset {
		OffsetValue::Number(offset) => Ok(offset),
		OffsetValue::Text(text) => text.trim().parse().map_err(|e| {
			WalletSyncError::ParseError(format!("Invalid wallet state offset {:?}: {}", text, e))
		}),
	}
}

impl PersistedWalletSnapshot {
	pub fn parse(serialized_state: String) -> Result<Self, WalletSyncError> {
		let offset = read_offset(&serialized_state)?;
		Ok(Self {
			serialized_state,
			offset,
		})
	}
}

/// Reads and writes snapshots in one directory through a [`Persistence`] adapter.
#[derive(Clone)]
pub struct SnapshotStore {
	persistence: Arc<dyn Persistence>,
	dir: PathBuf,
}

impl SnapshotStore {
	pub fn new(persistence: Arc<dyn Persistence>, dir: PathBuf) -> Self {
		Self { persistence, dir }
	}

	pub fn path_for(&self, name: &str) -> PathBuf {
		self.dir.join(name)
	}

	fn metadata_path_for(&self, name: &str) -> PathBuf {
		self.dir.join(format!("{}.meta.json", name))
	}

	/// Whether a snapshot named `name` exists.
	pub async fn exists(&self, name: &str) -> bool {
		self.persistence.exists(&self.path_for(name)).await
	}

	/// Load and parse the snapshot named `name`. `Ok(None)` when there is none.
	pub async fn load(
		&self,
		name: &str,
	) -> Result<Option<PersistedWalletSnapshot>, WalletSyncError> {
		let path = self.path_for(name);
		if !self.persistence.exists(&path).await {
			return Ok(None);
		}

		let bytes = self.persistence.read(&path).await?;
		let serialized_state = String::from_utf8(bytes).map_err(|e| {
			WalletSyncError::ParseError(format!("Wallet snapshot is not UTF-8: {}", e))
		})?;
		let snapshot = PersistedWalletSnapshot::parse(serialized_state)?;

		let saved_at = self.read_saved_at(name).await;
		info!(
			"Loaded wallet snapshot from {:?} at offset {} (saved {})",
			path,
			snapshot.offset,
			saved_at.as_deref().unwrap_or("at an unknown time")
		);
		Ok(Some(snapshot))
	}

	async fn read_saved_at(&self, name: &str) -> Option<String> {
		let bytes = self.persistence.read(&self.metadata_path_for(name)).await.ok()?;
		let metadata: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
		metadata
			.get("saved_at")
			.and_then(|s| s.as_str())
			.map(str::to_string)
	}

	/// Write `serialized_state` as the snapshot named `name`, creating the directory if needed.
	pub async fn save(
		&self,
		name: &str,
		serialized_state: &str,
	) -> Result<PathBuf, WalletSyncError> {
		let offset = read_offset(serialized_state).ok();

		self.persistence.create_dir_all(&self.dir).await?;

		let path = self.path_for(name);
		self.persistence
			.write(&path, serialized_state.as_bytes())
			.await?;

		let metadata = serde_json::json!({
			"offset": offset,
			"saved_at": chrono::Utc::now().to_rfc3339(),
		});
		let metadata_bytes = serde_json::to_vec_pretty(&metadata).map_err(|e| {
			WalletSyncError::ParseError(format!("Failed to serialize snapshot metadata: {}", e))
		})?;
		self.persistence
			.write(&self.metadata_path_for(name), &metadata_bytes)
			.await?;

		debug!("Wrote snapshot metadata for {}", name);
		info!("Saved wallet snapshot to {:?} at offset {:?}", path, offset);
		Ok(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::persistence::FsPersistence;

	fn store(dir: &std::path::Path) -> SnapshotStore {
		SnapshotStore::new(Arc::new(FsPersistence), dir.join("cache"))
	}

	#[test]
	fn offsets_accept_numbers_and_strings() {
		assert_eq!(read_offset(r#"{"offset": 42, "state": "aa"}"#).unwrap(), 42);
		assert_eq!(read_offset(r#"{"offset": "17"}"#).unwrap(), 17);
		assert!(read_offset(r#"{"offset": "x"}"#).is_err());
		assert!(read_offset(r#"{"state": "aa"}"#).is_err());
		assert!(read_offset("not json").is_err());
	}

	#[tokio::test]
	async fn save_then_load() {
		let dir = tempfile::tempdir().unwrap();
		let store = store(dir.path());
		let state = r#"{"offset": 99, "state": "abcd"}"#;

		assert!(store.load("wallet.state").await.unwrap().is_none());

		let path = store.save("wallet.state", state).await.unwrap();
		assert!(path.ends_with("cache/wallet.state"));
		assert!(store.exists("wallet.state").await);

		let snapshot = store.load("wallet.state").await.unwrap().unwrap();
		assert_eq!(snapshot.offset, 99);
		assert_eq!(snapshot.serialized_state, state);

		let metadata =
			std::fs::read_to_string(dir.path().join("cache/wallet.state.meta.json")).unwrap();
		assert!(metadata.contains("saved_at"));
	}

	#[tokio::test]
	async fn corrupted_snapshot_is_a_parse_error() {
		let dir = tempfile::tempdir().unwrap();
		let store = store(dir.path());
		std::fs::create_dir_all(dir.path().join("cache")).unwrap();
		std::fs::write(dir.path().join("cache/wallet.state"), b"{ truncated").unwrap();

		assert!(matches!(
			store.load("wallet.state").await,
			Err(WalletSyncError::ParseError(_))
		));
	}
}
