//! Throttled progress logging for long waits.
//!
//! The wallet state stream can emit many updates per second while catching up. The
//! [`ProgressLogger`] lets at most one line through per interval so sync and funding waits stay
//! observable without flooding the log.

use crate::utils::format_token_amount;
use crate::wallet::types::{MIDNIGHT_TOKEN_DECIMALS, SyncState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Rate limiter for progress log lines.
#[derive(Debug, Clone)]
pub struct ProgressLogger {
    interval: Duration,
    last_logged: Option<Instant>,
    /// Updates seen since the last emitted line
    suppressed: usize,
}

impl ProgressLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Whether a line may be logged now. Records the emission when it returns true.
    pub fn should_log(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .last_logged
            .map(|last| now.duration_since(last) >= self.interval)
            .unwrap_or(true);
        if due {
            self.last_logged = Some(now);
            self.suppressed = 0;
        } else {
            self.suppressed += 1;
        }
        due
    }

    /// Number of updates swallowed since the last emitted line.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Log sync lag, at most once per interval.
    pub fn log_sync(&mut self, state: &SyncState) {
        if !self.should_log() {
            return;
        }
        match state.progress {
            Some(progress) => info!(
                "Wallet sync progress: applied lag {}, source lag {}, synced {}",
                progress.applied_lag, progress.source_lag, progress.synced
            ),
            None => info!("Waiting for the wallet to report sync progress"),
        }
    }

    /// Log the balance while waiting for funds, at most once per interval.
    pub fn log_funds(&mut self, state: &SyncState) {
        if !self.should_log() {
            return;
        }
        info!(
            "Waiting to receive tokens at {}: balance {} tDUST, {} transactions",
            state.address,
            format_token_amount(state.native_balance(), MIDNIGHT_TOKEN_DECIMALS),
            state.transaction_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn logs_at_most_once_per_interval() {
        let mut logger = ProgressLogger::new(Duration::from_secs(10));

        assert!(logger.should_log());
        assert!(!logger.should_log());
        assert!(!logger.should_log());
        assert_eq!(logger.suppressed(), 2);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!logger.should_log());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(logger.should_log());
        assert_eq!(logger.suppressed(), 0);
    }
}
