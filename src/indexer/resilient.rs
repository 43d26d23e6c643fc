//! Retrying wrapper around a [`PublicDataProvider`].
//!
//! Every one-shot call goes through [`execute_with_retry`] labelled with the call name. The
//! contract state subscription is passed through untouched since it is a continuous stream.
//! Callers see the wrapped provider's own error type.

use super::provider::{ContractStateStream, PublicDataProvider};
use super::types::*;
use crate::events::{CallbackScope, ProviderCallback, ProviderCallbackEvent};
use crate::retry::{RetryPolicy, execute_with_retry_if};
use std::sync::Arc;

/// Decides whether a provider error is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&IndexerError) -> bool + Send + Sync>;

/// [`PublicDataProvider`] that retries transient failures of an inner provider.
pub struct ResilientPublicDataProvider<P> {
	inner: P,
	policy: RetryPolicy,
	tx_watch_policy: RetryPolicy,
	callback: Option<ProviderCallback>,
	is_retryable: Option<RetryPredicate>,
}

impl<P: PublicDataProvider> ResilientPublicDataProvider<P> {
	pub fn new(inner: P) -> Self {
		Self {
			inner,
			policy: RetryPolicy::default(),
			tx_watch_policy: RetryPolicy::transaction_watch(),
			callback: None,
			is_retryable: None,
		}
	}

	/// Policy for every call except `watch_for_tx_data`.
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;
		self
	}

	/// Policy for `watch_for_tx_data`.
	pub fn with_tx_watch_policy(mut self, policy: RetryPolicy) -> Self {
		self.tx_watch_policy = policy;
		self
	}

	/// Receive `watchForTxData` lifecycle events.
	pub fn with_callback(mut self, callback: ProviderCallback) -> Self {
		self.callback = Some(callback);
		self
	}

	/// Errors rejected by `predicate` are returned without retrying.
	pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
		self.is_retryable = Some(predicate);
		self
	}

	pub fn inner(&self) -> &P {
		&self.inner
	}

	fn retryable(&self, error: &IndexerError) -> bool {
		self.is_retryable
			.as_ref()
			.map(|predicate| predicate(error))
			.unwrap_or(true)
	}
}

#[async_trait::async_trait]
impl<P: PublicDataProvider> PublicDataProvider for ResilientPublicDataProvider<P> {
	async fn query_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<ContractState>, IndexerError> {
		execute_with_retry_if(
			|| self.inner.query_contract_state(address, offset),
			&self.policy,
			"queryContractState",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn query_zswap_and_contract_state(
		&self,
		address: &ContractAddress,
		offset: Option<&BlockOffset>,
	) -> Result<Option<(ZswapChainState, ContractState)>, IndexerError> {
		execute_with_retry_if(
			|| self.inner.query_zswap_and_contract_state(address, offset),
			&self.policy,
			"queryZSwapAndContractState",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn query_deploy_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<Option<ContractState>, IndexerError> {
		execute_with_retry_if(
			|| self.inner.query_deploy_contract_state(address),
			&self.policy,
			"queryDeployContractState",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn watch_for_contract_state(
		&self,
		address: &ContractAddress,
	) -> Result<ContractState, IndexerError> {
		execute_with_retry_if(
			|| self.inner.watch_for_contract_state(address),
			&self.policy,
			"watchForContractState",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn watch_for_deploy_tx_data(
		&self,
		address: &ContractAddress,
	) -> Result<FinalizedTxData, IndexerError> {
		execute_with_retry_if(
			|| self.inner.watch_for_deploy_tx_data(address),
			&self.policy,
			"watchForDeployTxData",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn watch_for_tx_data(&self, tx_id: &str) -> Result<FinalizedTxData, IndexerError> {
		let _scope = CallbackScope::enter(
			self.callback.as_ref(),
			ProviderCallbackEvent::WatchForTxDataStarted,
			ProviderCallbackEvent::WatchForTxDataDone,
		);
		execute_with_retry_if(
			|| self.inner.watch_for_tx_data(tx_id),
			&self.tx_watch_policy,
			"watchForTxData",
			|e| self.retryable(e),
		)
		.await
		.map_err(|e| e.into_inner())
	}

	async fn contract_state_observable(
		&self,
		address: &ContractAddress,
		config: &ContractStateObservableConfig,
	) -> Result<ContractStateStream, IndexerError> {
		self.inner.contract_state_observable(address, config).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::AppConfig;
	use crate::events::tests::recording_callback;
	use futures::StreamExt;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::time::Duration;

	/// Provider whose calls fail until `failures` calls have been made.
	struct FlakyProvider {
		failures: u32,
		calls: AtomicU32,
		stream_calls: AtomicU32,
	}

	impl FlakyProvider {
		fn failing(failures: u32) -> Self {
			Self {
				failures,
				calls: AtomicU32::new(0),
				stream_calls: AtomicU32::new(0),
			}
		}

		fn attempt(&self) -> Result<(), IndexerError> {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			if n <= self.failures {
				Err(IndexerError::NoData)
			} else {
				Ok(())
			}
		}

		fn tx(&self) -> FinalizedTxData {
			FinalizedTxData {
				hash: "aa".into(),
				identifiers: vec!["01".into()],
				apply_stage: ApplyStage::SucceedEntirely,
				block: BlockRef {
					height: 7,
					hash: "bb".into(),
				},
			}
		}
	}

	#[async_trait::async_trait]
	impl PublicDataProvider for FlakyProvider {
		async fn query_contract_state(
			&self,
			_address: &ContractAddress,
			_offset: Option<&BlockOffset>,
		) -> Result<Option<ContractState>, IndexerError> {
			self.attempt()?;
			Ok(Some(ContractState("00".into())))
		}

		async fn query_zswap_and_contract_state(
			&self,
			_address: &ContractAddress,
			_offset: Option<&BlockOffset>,
		) -> Result<Option<(ZswapChainState, ContractState)>, IndexerError> {
			self.attempt()?;
			Ok(None)
		}

		async fn query_deploy_contract_state(
			&self,
			_address: &ContractAddress,
		) -> Result<Option<ContractState>, IndexerError> {
			self.attempt()?;
			Ok(None)
		}

		async fn watch_for_contract_state(
			&self,
			_address: &ContractAddress,
		) -> Result<ContractState, IndexerError> {
			self.attempt()?;
			Ok(ContractState("01".into()))
		}

		async fn watch_for_deploy_tx_data(
			&self,
			_address: &ContractAddress,
		) -> Result<FinalizedTxData, IndexerError> {
			self.attempt()?;
			Ok(self.tx())
		}

		async fn watch_for_tx_data(&self, _tx_id: &str) -> Result<FinalizedTxData, IndexerError> {
			self.attempt()?;
			Ok(self.tx())
		}

		async fn contract_state_observable(
			&self,
			_address: &ContractAddress,
			_config: &ContractStateObservableConfig,
		) -> Result<ContractStateStream, IndexerError> {
			self.stream_calls.fetch_add(1, Ordering::SeqCst);
			self.attempt()?;
			Ok(futures::stream::iter(vec![Ok(ContractState("02".into()))]).boxed())
		}
	}

	fn address() -> ContractAddress {
		"0a0b".parse().unwrap()
	}

	fn fast_policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy::new(
			max_attempts,
			Duration::from_millis(10),
			2.0,
			Duration::from_millis(100),
		)
		.unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn queries_recover_from_transient_failures() {
		let provider =
			ResilientPublicDataProvider::new(FlakyProvider::failing(2)).with_policy(fast_policy(3));

		let state = provider
			.query_contract_state(&address(), Some(&BlockOffset::Height(3)))
			.await
			.unwrap();

		assert_eq!(state, Some(ContractState("00".into())));
		assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_queries_return_underlying_error() {
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(10))
			.with_policy(fast_policy(2));

		let err = provider
			.query_deploy_contract_state(&address())
			.await
			.unwrap_err();

		assert!(matches!(err, IndexerError::NoData));
		assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn watch_for_tx_data_brackets_with_callbacks() {
		let (callback, seen) = recording_callback();
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(1))
			.with_tx_watch_policy(fast_policy(3))
			.with_callback(callback);

		let tx = provider.watch_for_tx_data("01").await.unwrap();

		assert_eq!(tx.block.height, 7);
		assert_eq!(
			*seen.lock().unwrap(),
			vec![
				ProviderCallbackEvent::WatchForTxDataStarted,
				ProviderCallbackEvent::WatchForTxDataDone
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn watch_for_tx_data_emits_done_on_failure() {
		let (callback, seen) = recording_callback();
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(10))
			.with_tx_watch_policy(fast_policy(1))
			.with_callback(callback);

		assert!(provider.watch_for_tx_data("01").await.is_err());
		assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 2);
		assert_eq!(
			*seen.lock().unwrap(),
			vec![
				ProviderCallbackEvent::WatchForTxDataStarted,
				ProviderCallbackEvent::WatchForTxDataDone
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn tx_watch_uses_one_second_floor_by_default() {
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(1));
		let started = tokio::time::Instant::now();

		provider.watch_for_tx_data("01").await.unwrap();

		assert!(started.elapsed() >= Duration::from_millis(1000));
	}

	#[tokio::test(start_paused = true)]
	async fn configured_tx_watch_keeps_one_second_floor() {
		let config = AppConfig::from_lookup(|key| {
			(key == "MIDNIGHT_NETWORK").then(|| "standalone".to_string())
		})
		.unwrap();
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(1))
			.with_policy(config.retry_policy)
			.with_tx_watch_policy(config.tx_watch_policy);
		let started = tokio::time::Instant::now();

		provider.watch_for_tx_data("01").await.unwrap();

		assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 2);
		assert!(started.elapsed() >= Duration::from_millis(1000));
	}

	#[tokio::test(start_paused = true)]
	async fn predicate_stops_retries() {
		let provider = ResilientPublicDataProvider::new(FlakyProvider::failing(10))
			.with_policy(fast_policy(5))
			.with_retry_predicate(Arc::new(|e| !matches!(e, IndexerError::NoData)));

		assert!(provider.watch_for_contract_state(&address()).await.is_err());
		assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn subscription_is_not_retried() {
		let provider =
			ResilientPublicDataProvider::new(FlakyProvider::failing(1)).with_policy(fast_policy(5));

		assert!(
			provider
				.contract_state_observable(&address(), &ContractStateObservableConfig::Latest)
				.await
				.is_err()
		);
		assert_eq!(provider.inner().stream_calls.load(Ordering::SeqCst), 1);

		let mut stream = provider
			.contract_state_observable(&address(), &ContractStateObservableConfig::All)
			.await
			.unwrap();
		assert_eq!(stream.next().await.unwrap().unwrap(), ContractState("02".into()));
	}
}
