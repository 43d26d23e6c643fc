use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Byte storage for serialized wallet snapshots.
///
/// Only the synchronizer's restore and save paths use it. A synchronizer without persistence
/// always builds wallets from scratch.
#[async_trait]
pub trait Persistence: Send + Sync {
	async fn exists(&self, path: &Path) -> bool;
	async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
	async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
	async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Local filesystem implementation of [`Persistence`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPersistence;

#[async_trait]
impl Persistence for FsPersistence {
	async fn exists(&self, path: &Path) -> bool {
		tokio::fs::try_exists(path).await.unwrap_or(false)
	}

	async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
		let mut file = tokio::fs::File::open(path).await?;
		let mut bytes = Vec::new();
		file.read_to_end(&mut bytes).await?;
		Ok(bytes)
	}

	async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
		let mut file = tokio::fs::File::create(path).await?;
		file.write_all(bytes).await?;
		file.flush().await?;
		Ok(())
	}

	async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
		tokio::fs::create_dir_all(path).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn fs_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let nested = dir.path().join("a/b");
		let file = nested.join("state");
		let fs = FsPersistence;

		assert!(!fs.exists(&file).await);
		fs.create_dir_all(&nested).await.unwrap();
		fs.write(&file, b"hello").await.unwrap();

		assert!(fs.exists(&file).await);
		assert_eq!(fs.read(&file).await.unwrap(), b"hello");
	}

	#[tokio::test]
	async fn reading_missing_file_fails() {
		let dir = tempfile::tempdir().unwrap();
		assert!(FsPersistence.read(&dir.path().join("nope")).await.is_err());
	}
}
