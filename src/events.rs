//! Lifecycle notifications emitted by the providers.
//!
//! A UI or CLI registers a [`ProviderCallback`] to follow long-running provider work such as
//! prover key downloads and transaction finality watches. Callbacks are fire-and-forget: they
//! are invoked synchronously and must return quickly.

use std::fmt;
use std::sync::Arc;

/// Lifecycle event tags delivered to a [`ProviderCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProviderCallbackEvent {
	DownloadProverStarted,
	DownloadProverDone,
	WatchForTxDataStarted,
	WatchForTxDataDone,
}

impl ProviderCallbackEvent {
	/// Camel-case tag, as consumed by UI code.
	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderCallbackEvent::DownloadProverStarted => "downloadProverStarted",
			ProviderCallbackEvent::DownloadProverDone => "downloadProverDone",
			ProviderCallbackEvent::WatchForTxDataStarted => "watchForTxDataStarted",
			ProviderCallbackEvent::WatchForTxDataDone => "watchForTxDataDone",
		}
	}
}

impl fmt::Display for ProviderCallbackEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Callback invoked with each lifecycle event.
pub type ProviderCallback = Arc<dyn Fn(ProviderCallbackEvent) + Send + Sync>;

/// Emits a start event on creation and the paired done event when dropped.
///
/// Dropping happens on success, on error and when the surrounding future is cancelled, so a
/// started signal is always followed by exactly one done signal.
pub(crate) struct CallbackScope {
	callback: Option<ProviderCallback>,
	done: ProviderCallbackEvent,
}

impl CallbackScope {
	pub(crate) fn enter(
		callback: Option<&ProviderCallback>,
		started: ProviderCallbackEvent,
		done: ProviderCallbackEvent,
	) -> Self {
		if let Some(callback) = callback {
			callback(started);
		}
		Self {
			callback: callback.cloned(),
			done,
		}
	}
}

impl Drop for CallbackScope {
	fn drop(&mut self) {
		if let Some(callback) = &self.callback {
			callback(self.done);
		}
	}
}
