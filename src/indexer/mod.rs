//! Indexer integration module for the Midnight blockchain
//!
//! This module provides the GraphQL client for the Midnight public data indexer, the typed
//! [`PublicDataProvider`] built on it, and the retrying [`ResilientPublicDataProvider`] that
//! every caller should go through.

/// GraphQL client for interacting with the Midnight indexer
mod client;
/// Public data provider trait and its indexer-backed implementation
mod provider;
/// Retrying provider wrapper
mod resilient;
/// Type definitions for indexer data structures
mod types;

pub use client::{MidnightIndexerClient, SubscriptionStream};
pub use provider::{ContractStateStream, IndexerPublicDataProvider, PublicDataProvider};
pub use resilient::{ResilientPublicDataProvider, RetryPredicate};
pub use types::*;
