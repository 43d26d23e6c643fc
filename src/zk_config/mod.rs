//! Zero-knowledge artifact retrieval.
//!
//! Proving a contract call needs the circuit's prover key, verifier key and ZKIR. They are
//! large and never change for a deployment, so [`CachedZkConfigProvider`] memoizes whatever the
//! backend (normally [`HttpZkConfigProvider`]) returns for the lifetime of the process.

/// Memoizing provider
mod cache;
/// HTTP artifact backend
mod http;
/// Artifact types
mod types;

pub use cache::CachedZkConfigProvider;
pub use http::HttpZkConfigProvider;
pub use types::*;

/// Source of circuit artifacts.
#[async_trait::async_trait]
pub trait ZkConfigProvider: Send + Sync {
    async fn get_prover_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError>;

    async fn get_verifier_key(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError>;

    async fn get_zkir(&self, circuit: &CircuitId) -> Result<Artifact, ZkConfigError>;

    /// Verifier keys for several circuits, in the order given.
    async fn get_verifier_keys(
        &self,
        circuits: &[CircuitId],
    ) -> Result<Vec<(CircuitId, Artifact)>, ZkConfigError> {
        let mut keys = Vec::with_capacity(circuits.len());
        for circuit in circuits {
            keys.push((circuit.clone(), self.get_verifier_key(circuit).await?));
        }
        Ok(keys)
    }

    /// All artifacts of one circuit.
    async fn get(&self, circuit: &CircuitId) -> Result<ZkConfig, ZkConfigError> {
        Ok(ZkConfig {
            circuit: circuit.clone(),
            prover_key: self.get_prover_key(circuit).await?,
            verifier_key: self.get_verifier_key(circuit).await?,
            zkir: self.get_zkir(circuit).await?,
        })
    }
}
