//! Retry-with-exponential-backoff executor.
//!
//! Reads against the indexer are eventually consistent and the network between us and it is
//! unreliable. Every one-shot provider call is therefore wrapped in [`execute_with_retry`],
//! which re-invokes the operation on a [`RetryPolicy`] schedule. The schedule is driven by
//! `backoff::future::retry_notify`; [`RetryPolicy`] only decides the delays and the attempt
//! budget.
//!
//! All errors are retryable by default. Callers that need to short-circuit on fatal errors
//! use [`execute_with_retry_if`] with a predicate.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use tracing::{debug, error, info};

/// Delay schedule and attempt budget for one retried call.
///
/// `max_attempts` counts retries after the first invocation, so an operation is invoked at
/// most `max_attempts + 1` times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub initial_delay: Duration,
	pub backoff_factor: f64,
	pub max_delay: Duration,
}

/// Rejected [`RetryPolicy`] parameters.
#[derive(Debug, thiserror::Error)]
pub enum RetryPolicyError {
	#[error("Backoff factor must be greater than 1, got {0}")]
	InvalidFactor(f64),

	#[error("Initial delay {initial:?} exceeds maximum delay {max:?}")]
	InitialAboveMax { initial: Duration, max: Duration },
}

impl RetryPolicy {
	pub fn new(
		max_attempts: u32,
		initial_delay: Duration,
		backoff_factor: f64,
		max_delay: Duration,
	) -> Result<Self, RetryPolicyError> {
		if !backoff_factor.is_finite() || backoff_factor <= 1.0 {
			return Err(RetryPolicyError::InvalidFactor(backoff_factor));
		}
		if initial_delay > max_delay {
			return Err(RetryPolicyError::InitialAboveMax {
				initial: initial_delay,
				max: max_delay,
			});
		}
		Ok(Self {
			max_attempts,
			initial_delay,
			backoff_factor,
			max_delay,
		})
	}

	/// Policy for transaction finality watches.
	///
	/// Finality can take far longer than an ordinary read, so the delay floor is one second.
	pub fn transaction_watch() -> Self {
		Self {
			initial_delay: Duration::from_millis(1000),
			..Self::default()
		}
	}

	/// Same policy with a different attempt budget.
	pub fn with_max_attempts(self, max_attempts: u32) -> Self {
		Self {
			max_attempts,
			..self
		}
	}

	/// Delay slept before retry number `attempt` (zero based).
	///
	/// Always `min(initial_delay * backoff_factor^attempt, max_delay)`.
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
		let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
		if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
			self.max_delay
		} else if secs <= 0.0 {
			Duration::ZERO
		} else {
			Duration::from_secs_f64(secs)
		}
	}

	fn schedule(&self) -> PolicySchedule {
		PolicySchedule {
			policy: *self,
			retries: 0,
		}
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 10,
			initial_delay: Duration::from_millis(500),
			backoff_factor: 1.2,
			max_delay: Duration::from_secs(30),
		}
	}
}

/// `Backoff` implementation that yields the policy's delays and stops after its budget.
struct PolicySchedule {
	policy: RetryPolicy,
	retries: u32,
}

impl Backoff for PolicySchedule {
	fn next_backoff(&mut self) -> Option<Duration> {
		if self.retries >= self.policy.max_attempts {
			return None;
		}
		let delay = self.policy.delay_for_attempt(self.retries);
		self.retries += 1;
		Some(delay)
	}

	fn reset(&mut self) {
		self.retries = 0;
	}
}

/// The last error of a retried call, tagged with the call label and attempt count.
#[derive(Debug, thiserror::Error)]
#[error("{label} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E> {
	pub label: String,
	pub attempts: u32,
	pub last_error: E,
}

impl<E> RetryError<E> {
	/// Drop the diagnostics and return the underlying error.
	pub fn into_inner(self) -> E {
		self.last_error
	}
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
pub async fn execute_with_retry<T, E, F, Fut>(
	operation: F,
	policy: &RetryPolicy,
	label: &str,
) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
{
	execute_with_retry_if(operation, policy, label, |_: &E| true).await
}

/// Like [`execute_with_retry`], but errors rejected by `is_retryable` are returned at once.
pub async fn execute_with_retry_if<T, E, F, Fut, P>(
	mut operation: F,
	policy: &RetryPolicy,
	label: &str,
	is_retryable: P,
) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
	P: Fn(&E) -> bool,
{
	let mut attempts = 0u32;
	let is_retryable = &is_retryable;

	let result = backoff::future::retry_notify(
		policy.schedule(),
		|| {
			attempts += 1;
			let attempt = attempts;
			let call = operation();
			async move {
				match call.await {
					Ok(value) => {
						if attempt > 1 {
							info!("{} succeeded on attempt {}", label, attempt);
						}
						Ok(value)
					}
					Err(e) => {
						error!("{} failed on attempt {}: {}", label, attempt, e);
						if is_retryable(&e) {
							Err(backoff::Error::transient(e))
						} else {
							Err(backoff::Error::permanent(e))
						}
					}
				}
			}
		},
		|_: E, delay: Duration| {
			debug!("Retrying {} in {:?}", label, delay);
		},
	)
	.await;

	result.map_err(|last_error| {
		error!("{} gave up after {} attempt(s)", label, attempts);
		RetryError {
			label: label.to_string(),
			attempts,
			last_error,
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::time::Instant;

	#[derive(Debug, PartialEq)]
	struct Flaky(u32);

	impl std::fmt::Display for Flaky {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "flaky failure #{}", self.0)
		}
	}

	fn policy(max_attempts: u32, initial_ms: u64, factor: f64, max_ms: u64) -> RetryPolicy {
		RetryPolicy::new(
			max_attempts,
			Duration::from_millis(initial_ms),
			factor,
			Duration::from_millis(max_ms),
		)
		.unwrap()
	}

	#[test]
	fn delays_grow_geometrically_and_are_capped() {
		let policy = policy(10, 100, 2.0, 1000);
		assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
		assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
		assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
		assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
		assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(1000));

		for attempt in 0..64 {
			assert!(policy.delay_for_attempt(attempt) <= policy.max_delay);
		}
	}

	#[test]
	fn default_policies() {
		let default = RetryPolicy::default();
		assert_eq!(default.max_attempts, 10);
		assert_eq!(default.initial_delay, Duration::from_millis(500));
		assert_eq!(default.max_delay, Duration::from_secs(30));

		let watch = RetryPolicy::transaction_watch();
		assert_eq!(watch.initial_delay, Duration::from_millis(1000));
		assert_eq!(watch.backoff_factor, default.backoff_factor);
	}

	#[test]
	fn rejects_invalid_policies() {
		assert!(matches!(
			RetryPolicy::new(3, Duration::from_millis(10), 1.0, Duration::from_secs(1)),
			Err(RetryPolicyError::InvalidFactor(_))
		));
		assert!(matches!(
			RetryPolicy::new(3, Duration::from_secs(2), 2.0, Duration::from_secs(1)),
			Err(RetryPolicyError::InitialAboveMax { .. })
		));
	}

	#[test]
	fn hand_built_negative_factor_does_not_panic() {
		let policy = RetryPolicy {
			max_attempts: 3,
			initial_delay: Duration::from_millis(100),
			backoff_factor: -2.0,
			max_delay: Duration::from_secs(1),
		};

		assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
		assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
		assert!(policy.delay_for_attempt(2) > Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn fails_twice_then_returns_value_after_backoff() {
		let calls = AtomicU32::new(0);
		let started = Instant::now();

		let result = execute_with_retry(
			|| async {
				let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
				if n <= 2 { Err(Flaky(n)) } else { Ok(42) }
			},
			&policy(3, 100, 2.0, 1000),
			"answer",
		)
		.await;

		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		let waited = started.elapsed();
		assert!(waited >= Duration::from_millis(300), "waited {:?}", waited);
		assert!(waited < Duration::from_millis(310), "waited {:?}", waited);
	}

	#[tokio::test(start_paused = true)]
	async fn exhaustion_returns_last_error_with_label() {
		let calls = AtomicU32::new(0);

		let err = execute_with_retry(
			|| async {
				let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
				Err::<(), _>(Flaky(n))
			},
			&policy(3, 10, 2.0, 1000),
			"queryContractState",
		)
		.await
		.unwrap_err();

		assert_eq!(calls.load(Ordering::SeqCst), 4);
		assert_eq!(err.attempts, 4);
		assert_eq!(err.label, "queryContractState");
		assert_eq!(err.last_error, Flaky(4));
		assert!(err.to_string().contains("queryContractState"));
		assert_eq!(err.into_inner(), Flaky(4));
	}

	#[tokio::test(start_paused = true)]
	async fn zero_attempts_invokes_once() {
		let calls = AtomicU32::new(0);

		let result = execute_with_retry(
			|| async {
				calls.fetch_add(1, Ordering::SeqCst);
				Err::<(), _>(Flaky(1))
			},
			&policy(0, 10, 2.0, 1000),
			"once",
		)
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn non_retryable_errors_short_circuit() {
		let calls = AtomicU32::new(0);
		let started = Instant::now();

		let err = execute_with_retry_if(
			|| async {
				let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
				Err::<(), _>(Flaky(n))
			},
			&policy(5, 100, 2.0, 1000),
			"fatal",
			|e: &Flaky| e.0 != 1,
		)
		.await
		.unwrap_err();

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(err.attempts, 1);
		assert!(started.elapsed() < Duration::from_millis(100));
	}

	#[tokio::test]
	async fn first_try_success_does_not_sleep() {
		let result: Result<u8, RetryError<Flaky>> =
			execute_with_retry(|| async { Ok(7) }, &RetryPolicy::default(), "fast").await;
		assert_eq!(result.unwrap(), 7);
	}
}
