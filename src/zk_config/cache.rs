//! Memoizing artifact provider.
//!
//! Entries are written once and never evicted. The artifact set is fixed per deployment, so
//! the cache stays small. Concurrent misses on the same key each reach the backend; the first
//! one to finish fills the entry and later results are discarded in favor of it.

use super::{Artifact, ArtifactKind, CacheKey, CircuitId, ZkConfigError, ZkConfigProvider};
use crate::events::{CallbackScope, ProviderCallback, ProviderCallbackEvent};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// [`ZkConfigProvider`] that caches every artifact fetched from `inner`.
pub struct CachedZkConfigProvider<P> {
	inner: P,
	cache: Mutex<HashMap<CacheKey, Artifact>>,
	callback: Option<ProviderCallback>,
}

impl<P: ZkConfigProvider> CachedZkConfigProvider<P> {
	pub fn new(inner: P) -> Self {
		Self {
			inner,
			cache: Mutex::new(HashMap::new()),
			callback: None,
		}
	}

	/// Receive `downloadProver` lifecycle events around prover key downloads.
	pub fn with_callback(mut self, callback: ProviderCallback) -> Self {
		self.callback = Some(callback);
		self
	}

	/// Number of cached artifacts.
	pub fn len(&self) -> usize {
		self.entries().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries().is_empty()
	}

	fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Artifact>> {
		self.cache
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Cached artifact for `(kind, circuit)`, fetching it on first use.
	pub async fn get_artifact(
		&self,
		kind: ArtifactKind,
		circuit: &CircuitId,
	) -> Result<Artifact, ZkConfigError> {
		let key = CacheKey {
			kind,
			circuit: circuit.clone(),
		};

		let cached = self.entries().get(&key).cloned();
		if let Some(hit) = cached {
			debug!("Cache hit for {} of circuit {}", kind, circuit);
			return Ok(hit);
		}

		let fetched = match kind {
			ArtifactKind::ProverKey => {
				let _scope = CallbackScope::enter(
					self.callback.as_ref(),
					ProviderCallbackEvent::DownloadProverStarted,
					ProviderCallbackEvent::DownloadProverDone,
				);
				info!("Downloading prover key for circuit {}", circuit);
				self.inner.get_prover_key(circuit).await?
			}
			ArtifactKind::VerifierKey => self.inner.get_verifier_key(circuit).await?,
			ArtifactKind::Zkir => self.inner.get_zkir(circuit).await?,
		};

		Ok(self.entries().entry(key).or_insert(fetched).clone())
	}
}

#[async_trait::async_trait]
impl<P: ZkConfigProvider> ZkConfigProvider for CachedZkConfigProvider<P> {
	async fn get_prover_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.get_artifact(ArtifactKind::ProverKey, circuit).await
	}

	async fn get_verifier_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.get_artifact(ArtifactKind::VerifierKey, circuit).await
	}

	async fn get_zkir(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.get_artifact(ArtifactKind::Zkir, circuit).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::tests::recording_callback;
	use std::sync::atomic::{AtomicU32, Ordering};

	/// Backend returning a different artifact on every raw call.
	#[derive(Default)]
	struct CountingBackend {
		calls: AtomicU32,
		fail_prover: bool,
	}

	impl CountingBackend {
		fn next(&self, tag: &str) -> Artifact {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			Artifact::from(format!("{}-{}", tag, n).into_bytes())
		}
	}

	#[async_trait::async_trait]
	impl ZkConfigProvider for CountingBackend {
		async fn get_prover_key(&self, _circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
			if self.fail_prover {
				self.calls.fetch_add(1, Ordering::SeqCst);
				return Err(ZkConfigError::InvalidUrl("unreachable".into()));
			}
			Ok(self.next("prover"))
		}

		async fn get_verifier_key(&self, _circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
			Ok(self.next("verifier"))
		}

		async fn get_zkir(&self, _circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
			Ok(self.next("zkir"))
		}
	}

	#[tokio::test]
	async fn second_lookup_is_served_from_cache() {
		let cache = CachedZkConfigProvider::new(CountingBackend::default());
		let circuit = CircuitId::from("increment");

		let first = cache
			.get_artifact(ArtifactKind::ProverKey, &circuit)
			.await
			.unwrap();
		let second = cache
			.get_artifact(ArtifactKind::ProverKey, &circuit)
			.await
			.unwrap();

		assert_eq!(first.as_bytes(), b"prover-1");
		assert_eq!(second, first);
		assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn keys_are_per_kind_and_circuit() {
		let cache = CachedZkConfigProvider::new(CountingBackend::default());
		let increment = CircuitId::from("increment");
		let breed = CircuitId::from("breed");

		cache.get_verifier_key(&increment).await.unwrap();
		cache.get_verifier_key(&breed).await.unwrap();
		cache.get_zkir(&increment).await.unwrap();
		cache.get_verifier_key(&increment).await.unwrap();

		assert_eq!(cache.len(), 3);
		assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn prover_download_is_bracketed_by_events() {
		let (callback, seen) = recording_callback();
		let cache = CachedZkConfigProvider::new(CountingBackend::default()).with_callback(callback);
		let circuit = CircuitId::from("increment");

		cache.get_prover_key(&circuit).await.unwrap();
		cache.get_prover_key(&circuit).await.unwrap();
		cache.get_verifier_key(&circuit).await.unwrap();

		assert_eq!(
			*seen.lock().unwrap(),
			vec![
				ProviderCallbackEvent::DownloadProverStarted,
				ProviderCallbackEvent::DownloadProverDone
			]
		);
	}

	#[tokio::test]
	async fn failed_prover_download_still_emits_done() {
		let (callback, seen) = recording_callback();
		let backend = CountingBackend {
			fail_prover: true,
			..Default::default()
		};
		let cache = CachedZkConfigProvider::new(backend).with_callback(callback);

		let result = cache.get_prover_key(&CircuitId::from("increment")).await;

		assert!(result.is_err());
		assert!(cache.is_empty());
		assert_eq!(
			*seen.lock().unwrap(),
			vec![
				ProviderCallbackEvent::DownloadProverStarted,
				ProviderCallbackEvent::DownloadProverDone
			]
		);
	}

	#[tokio::test]
	async fn full_config_and_batch_go_through_cache() {
		let cache = CachedZkConfigProvider::new(CountingBackend::default());
		let circuit = CircuitId::from("increment");

		let config = cache.get(&circuit).await.unwrap();
		let keys = cache
			.get_verifier_keys(&[circuit.clone(), circuit.clone()])
			.await
			.unwrap();

		assert_eq!(keys.len(), 2);
		assert_eq!(keys[0].1, config.verifier_key);
		assert_eq!(keys[1].1, config.verifier_key);
		assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 3);
	}
}
