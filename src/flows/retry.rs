//! Bounded linear backoff for token endpoint calls.

// crates.io
use tokio::time::{self, Instant};
// self
use crate::{_prelude::*, config::RetryConfig, obs};

/// Retry schedule applied to network exchanges.
///
/// Retry `n` (0-based) waits `min(start_interval + n * increase_interval, max_interval)`. Before
/// each sleep the time elapsed since the first attempt is compared with
/// `max_combined_timeout`; once exceeded the last error surfaces. Only
/// [retryable](Error::is_retryable) errors are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// First retry delay.
	pub start_interval: Duration,
	/// Amount added per retry.
	pub increase_interval: Duration,
	/// Cap on a single retry delay.
	pub max_interval: Duration,
	/// Total budget measured from the first attempt.
	pub max_combined_timeout: Duration,
}
impl RetryPolicy {
	/// Policy that surfaces the first error.
	pub const fn disabled() -> Self {
		Self {
			start_interval: Duration::ZERO,
			increase_interval: Duration::ZERO,
			max_interval: Duration::ZERO,
			max_combined_timeout: Duration::ZERO,
		}
	}

	/// Delay applied before retry `retry` (0-based).
	pub fn delay_for(&self, retry: u32) -> Duration {
		let grown = self
			.increase_interval
			.checked_mul(retry as i32)
			.and_then(|step| self.start_interval.checked_add(step))
			.unwrap_or(self.max_interval);

		grown.min(self.max_interval)
	}

	/// Runs `operation` until it succeeds, fails permanently, or the budget runs out.
	pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let started = Instant::now();
		let budget = self.max_combined_timeout.unsigned_abs();
		let mut retry = 0;

		loop {
			let err = match operation().await {
				Ok(value) => return Ok(value),
				Err(err) => err,
			};

			if !err.is_retryable() || budget.is_zero() || started.elapsed() > budget {
				return Err(err);
			}

			let delay = self.delay_for(retry);

			retry += 1;

			obs::retry_scheduled(retry, delay, &err);
			time::sleep(delay.unsigned_abs()).await;
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		RetryConfig::default().into()
	}
}
impl From<RetryConfig> for RetryPolicy {
	fn from(config: RetryConfig) -> Self {
		Self {
			start_interval: millis(config.start_interval_ms),
			increase_interval: millis(config.increase_interval_ms),
			max_interval: millis(config.max_interval_ms),
			max_combined_timeout: millis(config.max_combined_timeout_ms),
		}
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{TransientError, TransportError};

	fn unavailable() -> Error {
		TransientError::TokenEndpoint { message: "down".into(), status: Some(503), retry_after: None }
			.into()
	}

	#[test]
	fn delays_grow_linearly_then_cap() {
		let policy = RetryPolicy::default();
		let delays = (0..7).map(|n| policy.delay_for(n).whole_seconds()).collect::<Vec<_>>();

		assert_eq!(delays, [1, 2, 3, 4, 5, 5, 5]);
	}

	#[tokio::test(start_paused = true)]
	async fn stops_once_combined_timeout_is_exceeded() {
		let policy = RetryPolicy::default();
		let started = Instant::now();
		let calls = Mutex::new(Vec::new());
		let err = policy
			.run(|| {
				calls.lock().push(started.elapsed().as_secs());

				async { Err::<(), _>(unavailable()) }
			})
			.await
			.expect_err("Persistent failure should surface.");

		assert_eq!(err.status(), Some(503));
		assert_eq!(*calls.lock(), [0, 1, 3, 6, 10, 15]);
	}

	#[tokio::test(start_paused = true)]
	async fn non_retryable_errors_surface_immediately() {
		let calls = Mutex::new(0);
		let err = RetryPolicy::default()
			.run(|| {
				*calls.lock() += 1;

				async { Err::<(), _>(Error::CancelledByUser) }
			})
			.await
			.expect_err("Cancellation should surface.");

		assert!(matches!(err, Error::CancelledByUser));
		assert_eq!(*calls.lock(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn recovers_after_transient_failures() {
		let calls = Mutex::new(0);
		let value = RetryPolicy::default()
			.run(|| {
				let attempt = {
					let mut guard = calls.lock();

					*guard += 1;

					*guard
				};

				async move {
					if attempt < 3 {
						Err(TransportError::from(std::io::Error::other("offline")).into())
					} else {
						Ok(attempt)
					}
				}
			})
			.await
			.expect("Third attempt should succeed.");

		assert_eq!(value, 3);
	}

	#[tokio::test]
	async fn disabled_policy_never_retries() {
		let calls = Mutex::new(0);
		let _ = RetryPolicy::disabled()
			.run(|| {
				*calls.lock() += 1;

				async { Err::<(), _>(unavailable()) }
			})
			.await;

		assert_eq!(*calls.lock(), 1);
	}
}
