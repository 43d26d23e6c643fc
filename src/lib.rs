//! Resilient client layer for Midnight DApps.
//!
//! Wraps the indexer, the circuit artifact server and the wallet SDK with retrying, caching
//! and snapshot-restoring adapters so callers keep working through transient outages.

pub mod config;
pub mod events;
pub mod indexer;
pub mod retry;
pub mod utils;
pub mod wallet;
pub mod zk_config;

pub use config::{AppConfig, ConfigError, NetworkId};
pub use events::{ProviderCallback, ProviderCallbackEvent};
pub use retry::{RetryError, RetryPolicy, execute_with_retry, execute_with_retry_if};
