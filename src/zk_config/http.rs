//!
//! HTTP artifact backend.
//!
//! Artifacts are served as static files under a base URL:
//! `keys/<circuit>.prover`, `keys/<circuit>.verifier` and `zkir/<circuit>.bzkir`.

use super::{Artifact, CircuitId, ZkConfigError, ZkConfigProvider};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Fetches circuit artifacts over HTTP.
#[derive(Clone)]
pub struct HttpZkConfigProvider {
	client: Client,
	base_url: Url,
}

impl HttpZkConfigProvider {
	/// Creates a backend rooted at `base_url`.
	pub fn new(base_url: &str) -> Result<Self, ZkConfigError> {
		// Without a trailing slash `Url::join` would replace the last path segment.
		let normalized = if base_url.ends_with('/') {
			base_url.to_string()
		} else {
			format!("{}/", base_url)
		};
		let base_url = Url::parse(&normalized)
			.map_err(|e| ZkConfigError::InvalidUrl(format!("{}: {}", base_url, e)))?;

		let client = Client::builder()
			.timeout(Duration::from_secs(300))
			.build()?;

		Ok(Self { client, base_url })
	}

	fn artifact_url(&self, path: &str) -> Result<Url, ZkConfigError> {
		self.base_url
			.join(path)
			.map_err(|e| ZkConfigError::InvalidUrl(format!("{}: {}", path, e)))
	}

	async fn fetch(&self, path: &str) -> Result<Artifact, ZkConfigError> {
		let url = self.artifact_url(path)?;
		debug!("Fetching artifact from {}", url);

		let response = self.client.get(url).send().await?.error_for_status()?;
		let bytes = response.bytes().await?;

		debug!("Fetched {} bytes for {}", bytes.len(), path);
		Ok(Artifact::from(bytes.as_ref()))
	}
}

#[async_trait::async_trait]
impl ZkConfigProvider for HttpZkConfigProvider {
	async fn get_prover_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.fetch(&format!("keys/{}.prover", circuit)).await
	}

	async fn get_verifier_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.fetch(&format!("keys/{}.verifier", circuit)).await
	}

	async fn get_zkir(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError> {
		self.fetch(&format!("zkir/{}.bzkir", circuit)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn artifact_urls_keep_base_path() {
		let provider = HttpZkConfigProvider::new("http://localhost:8080/contract/managed").unwrap();
		assert_eq!(
			provider.artifact_url("keys/increment.prover").unwrap().as_str(),
			"http://localhost:8080/contract/managed/keys/increment.prover"
		);

		let provider = HttpZkConfigProvider::new("http://localhost:8080/zk/").unwrap();
		assert_eq!(
			provider.artifact_url("zkir/increment.bzkir").unwrap().as_str(),
			"http://localhost:8080/zk/zkir/increment.bzkir"
		);
	}

	#[test]
	fn rejects_invalid_base_url() {
		assert!(matches!(
			HttpZkConfigProvider::new("not a url"),
			Err(ZkConfigError::InvalidUrl(_))
		));
	}
}
