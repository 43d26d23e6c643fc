//! Types for zero-knowledge circuit artifacts

use std::fmt;
use std::sync::Arc;

/// Name of a contract circuit, e.g. `increment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircuitId(String);

impl CircuitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CircuitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three artifacts every circuit needs for proving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    ProverKey,
    VerifierKey,
    /// Zero-knowledge intermediate representation.
    Zkir,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::ProverKey => f.write_str("prover key"),
            ArtifactKind::VerifierKey => f.write_str("verifier key"),
            ArtifactKind::Zkir => f.write_str("zkir"),
        }
    }
}

/// Identifies one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ArtifactKind,
    pub circuit: CircuitId,
}

/// Raw artifact bytes. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact(Arc<[u8]>);

impl Artifact {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Artifact {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for Artifact {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

/// Every artifact of one circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkConfig {
    pub circuit: CircuitId,
    pub prover_key: Artifact,
    pub verifier_key: Artifact,
    pub zkir: Artifact,
}

/// Error types for artifact retrieval
#[derive(Debug, thiserror::Error)]
pub enum ZkConfigError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid artifact URL: {0}")]
    InvalidUrl(String),
}
