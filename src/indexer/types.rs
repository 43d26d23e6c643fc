//! Types for the public data indexer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction application stage from the indexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ApplyStage {
    /// Transaction is still pending
    Pending,
    /// Transaction succeeded entirely
    SucceedEntirely,
    /// Transaction succeeded partially
    SucceedPartially,
    /// Transaction failed entirely
    FailEntirely,
}

impl ApplyStage {
    /// Whether the transaction has been applied (fully or partially) on chain
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ApplyStage::SucceedEntirely | ApplyStage::SucceedPartially
        )
    }
}

/// Hex-encoded contract address, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim().trim_start_matches("0x").to_lowercase();
        if trimmed.is_empty() || hex::decode(&trimmed).is_err() {
            return Err(IndexerError::InvalidAddress(value));
        }
        Ok(Self(trimmed))
    }
}

impl std::str::FromStr for ContractAddress {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<ContractAddress> for String {
    fn from(address: ContractAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in chain history to read state at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOffset {
    Height(u64),
    Hash(String),
}

impl BlockOffset {
    /// GraphQL `BlockOffset` input value.
    pub fn to_variable(&self) -> serde_json::Value {
        match self {
            BlockOffset::Height(height) => serde_json::json!({ "height": height }),
            BlockOffset::Hash(hash) => serde_json::json!({ "hash": hash }),
        }
    }
}

/// Serialized on-chain contract state, as returned by the indexer (hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState(pub String);

/// Serialized Zswap chain state accompanying a contract state (hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZswapChainState(pub String);

/// Block a transaction was included in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u64,
    pub hash: String,
}

/// A transaction the indexer has seen included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTxData {
    /// The transaction hash.
    pub hash: String,
    /// Identifiers associated with the transaction.
    #[serde(default)]
    pub identifiers: Vec<String>,
    /// Application result on chain.
    #[serde(rename = "applyStage")]
    pub apply_stage: ApplyStage,
    /// Including block.
    pub block: BlockRef,
}

/// Where a contract state subscription starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractStateObservableConfig {
    /// Only states from now on.
    Latest,
    /// Every state since deployment.
    All,
    /// States from the block containing this transaction identifier.
    TxId(String),
    BlockHeight(u64),
    BlockHash(String),
}

impl ContractStateObservableConfig {
    /// GraphQL `ContractActionOffset` input value, `None` for the latest state.
    pub fn to_offset_variable(&self) -> Option<serde_json::Value> {
        match self {
            ContractStateObservableConfig::Latest => None,
            ContractStateObservableConfig::All => {
                Some(serde_json::json!({ "blockOffset": BlockOffset::Height(0).to_variable() }))
            }
            ContractStateObservableConfig::TxId(identifier) => {
                Some(serde_json::json!({ "transactionOffset": { "identifier": identifier } }))
            }
            ContractStateObservableConfig::BlockHeight(height) => Some(
                serde_json::json!({ "blockOffset": BlockOffset::Height(*height).to_variable() }),
            ),
            ContractStateObservableConfig::BlockHash(hash) => Some(
                serde_json::json!({ "blockOffset": BlockOffset::Hash(hash.clone()).to_variable() }),
            ),
        }
    }
}

/// Error types for indexer operations
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("GraphQL error: {0}")]
    GraphQLError(String),

    #[error("No data returned")]
    NoData,

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Invalid contract address: {0}")]
    InvalidAddress(String),
}
