//! Public data provider: typed contract and transaction reads against the indexer.
//!
//! [`PublicDataProvider`] is the seam the rest of the client depends on. The indexer-backed
//! implementation answers each call with one GraphQL request. Watch methods on it do not block:
//! while the awaited data is not indexed yet they fail with [`IndexerError::NoData`], and the
//! resilient wrapper turns that into bounded polling.

use super::client::{MidnightIndexerClient, SubscriptionStream};
use super::types::*;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Stream of contract states pushed by the indexer.
pub type ContractStateStream = BoxStream<'static, Result<ContractState, IndexerError>>;

/// Read access to public chain and contract state.
#[async_trait::async_trait]
pub trait PublicDataProvider: Send + Sync {
	/// Contract state at `offset`, or the latest state when no offset is given.
	async fn query_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<ContractState>, IndexerError>;

	/// Zswap chain state together with the contract state at the same point.
	async fn query_zswap_and_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<(ZswapChainState, ContractState)>, IndexerError>;

	/// State the contract was deployed with.
	async fn query_deploy_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<Option<ContractState>, IndexerError>;

	/// The contract's state once the contract is visible on chain.
	async fn watch_for_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<ContractState, IndexerError>;

	/// The deploy transaction of a contract once it is finalized.
	async fn watch_for_deploy_tx_data(
		&self,
		address: &ContractAddress,
	) -> Result<FinalizedTxData, IndexerError>;

	/// A transaction, by identifier, once it is finalized.
	async fn watch_for_tx_data(&self, tx_id: &str) -> Result<FinalizedTxData, IndexerError>;

	/// Continuous stream of contract states.
	async fn contract_state_observable(
		&self,
		address: &ContractAddress,
		config: &ContractStateObservableConfig,
	) -> Result<ContractStateStream, IndexerError>;
}

const CONTRACT_STATE_QUERY: &str = r#"
    query ContractState($address: HexEncoded!, $offset: ContractActionOffset) {
        contractAction(address: $address, offset: $offset) {
            state
        }
    }
"#;

const CONTRACT_AND_ZSWAP_STATE_QUERY: &str = r#"
    query ContractAndZswapState($address: HexEncoded!, $offset: ContractActionOffset) {
        contractAction(address: $address, offset: $offset) {
            state
            chainState
        }
    }
"#;

const DEPLOY_CONTRACT_STATE_QUERY: &str = r#"
    query DeployContractState($address: HexEncoded!) {
        contractAction(address: $address) {
            __typename
            ... on ContractDeploy {
                state
            }
            ... on ContractCall {
                deploy {
                    state
                }
            }
            ... on ContractUpdate {
                deploy {
                    state
                }
            }
        }
    }
"#;

const DEPLOY_TX_QUERY: &str = r#"
    query DeployTx($address: HexEncoded!) {
        contractAction(address: $address) {
            __typename
            ... on ContractDeploy {
                transaction { ...TxFields }
            }
            ... on ContractCall {
                deploy { transaction { ...TxFields } }
            }
            ... on ContractUpdate {
                deploy { transaction { ...TxFields } }
            }
        }
    }

    fragment TxFields on Transaction {
        hash
        identifiers
        applyStage
        block {
            height
            hash
        }
    }
"#;

const TX_ID_QUERY: &str = r#"
    query TxById($offset: TransactionOffset!) {
        transactions(offset: $offset) {
            hash
            identifiers
            applyStage
            block {
                height
                hash
            }
        }
    }
"#;

const CONTRACT_STATE_SUBSCRIPTION: &str = r#"
    subscription ContractStates($address: HexEncoded!, $offset: ContractActionOffset) {
        contractActions(address: $address, offset: $offset) {
            state
        }
    }
"#;

#[derive(Deserialize)]
struct StateOnly {
	state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateWithChain {
	state: String,
	chain_state: String,
}

/// Deploy action or the deploy reached through a later call/update.
#[derive(Deserialize)]
struct DeployAction<T> {
	#[serde(flatten)]
	direct: Option<T>,
	deploy: Option<T>,
}

#[derive(Deserialize)]
struct DeployTx {
	transaction: FinalizedTxData,
}

/// [`PublicDataProvider`] backed by the indexer GraphQL API.
#[derive(Clone)]
pub struct IndexerPublicDataProvider {
	client: MidnightIndexerClient,
}

impl IndexerPublicDataProvider {
	pub fn new(client: MidnightIndexerClient) -> Self {
		Self { client }
	}

	async fn contract_action(
		&self,
		query: &str,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<serde_json::Value>, IndexerError> {
		let mut variables = json!({ "address": address.as_str() });
		if let Some(offset) = offset {
			variables["offset"] = json!({ "blockOffset": offset.to_variable() });
		}
		let data = self.client.execute_query(query, Some(variables)).await?;
		Ok(data
			.get("contractAction")
			.filter(|action| !action.is_null())
			.cloned())
	}
}

#[async_trait::async_trait]
impl PublicDataProvider for IndexerPublicDataProvider {
	async fn query_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<ContractState>, IndexerError> {
		let action = self
			.contract_action(CONTRACT_STATE_QUERY, address, offset)
			.await?;
		match action {
			Some(action) => {
				let StateOnly { state } = serde_json::from_value(action)?;
				Ok(Some(ContractState(state)))
			}
			None => Ok(None),
		}
	}

	async fn query_zswap_and_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<(ZswapChainState, ContractState)>, IndexerError> {
		let action = self
			.contract_action(CONTRACT_AND_ZSWAP_STATE_QUERY, address, offset)
			.await?;
		match action {
			Some(action) => {
				let StateWithChain { state, chain_state } = serde_json::from_value(action)?;
				Ok(Some((ZswapChainState(chain_state), ContractState(state))))
			}
			None => Ok(None),
		}
	}

	async fn query_deploy_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<Option<ContractState>, IndexerError> {
		let action = self
			.contract_action(DEPLOY_CONTRACT_STATE_QUERY, address, None)
			.await?;
		match action {
			Some(action) => {
				let deploy: DeployAction<StateOnly> = serde_json::from_value(action)?;
				Ok(deploy
					.deploy
					.or(deploy.direct)
					.map(|StateOnly { state }| ContractState(state)))
			}
			None => Ok(None),
		}
	}

	async fn watch_for_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<ContractState, IndexerError> {
		debug!("Checking indexer for state of contract {}", address);
		self.query_contract_state(address, None)
			.await?
			.ok_or(IndexerError::NoData)
	}

	async fn watch_for_deploy_tx_data(
		&self,
		address: &ContractAddress,
	) -> Result<FinalizedTxData, IndexerError> {
		debug!("Checking indexer for deploy transaction of {}", address);
		let action = self
			.contract_action(DEPLOY_TX_QUERY, address, None)
			.await?
			.ok_or(IndexerError::NoData)?;
		let deploy: DeployAction<DeployTx> = serde_json::from_value(action)?;
		deploy
			.deploy
			.or(deploy.direct)
			.map(|d| d.transaction)
			.ok_or(IndexerError::NoData)
	}

	async fn watch_for_tx_data(&self, tx_id: &str) -> Result<FinalizedTxData, IndexerError> {
		debug!("Checking indexer for transaction {}", tx_id);
		let variables = json!({ "offset": { "identifier": tx_id } });
		let data = self
			.client
			.execute_query(TX_ID_QUERY, Some(variables))
			.await?;
		let transactions: Vec<FinalizedTxData> = match data.get("transactions") {
			Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
			_ => Vec::new(),
		};
		transactions.into_iter().next().ok_or(IndexerError::NoData)
	}

	async fn contract_state_observable(
		&self,
		address: &ContractAddress,
		config: &ContractStateObservableConfig,
	) -> Result<ContractStateStream, IndexerError> {
		let mut variables = json!({ "address": address.as_str() });
		if let Some(offset) = config.to_offset_variable() {
			variables["offset"] = offset;
		}
		let stream: SubscriptionStream = self
			.client
			.subscribe(
				&format!("contract-state-{}", address),
				CONTRACT_STATE_SUBSCRIPTION,
				variables,
				"contractActions",
			)
			.await?;

		Ok(stream
			.map(|item| {
				item.and_then(|value| {
					let StateOnly { state } = serde_json::from_value(value)?;
					Ok(ContractState(state))
				})
			})
			.boxed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deploy_action_prefers_nested_deploy() {
		let call = json!({
			"__typename": "ContractCall",
			"deploy": { "state": "aa" }
		});
		let parsed: DeployAction<StateOnly> = serde_json::from_value(call).unwrap();
		assert_eq!(parsed.deploy.map(|s| s.state).as_deref(), Some("aa"));

		let deploy = json!({ "__typename": "ContractDeploy", "state": "bb" });
		let parsed: DeployAction<StateOnly> = serde_json::from_value(deploy).unwrap();
		assert!(parsed.deploy.is_none());
		assert_eq!(parsed.direct.map(|s| s.state).as_deref(), Some("bb"));
	}
}
