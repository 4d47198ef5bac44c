// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token exchanges.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	refresh_attempts: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_failures: AtomicU64,
	renewals: AtomicU64,
	silent_renewals: AtomicU64,
	network_exchanges: AtomicU64,
}
impl ExchangeMetrics {
	/// Returns the total number of refresh-token grants started.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh-token grants that produced a token.
	pub fn refresh_successes(&self) -> u64 {
		self.refresh_successes.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh-token grants that failed after retries.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of full renewals started.
	pub fn renewals(&self) -> u64 {
		self.renewals.load(Ordering::Relaxed)
	}

	/// Returns how many renewals were satisfied by the cookie-driven redirect chase.
	pub fn silent_renewals(&self) -> u64 {
		self.silent_renewals.load(Ordering::Relaxed)
	}

	/// Returns the number of token endpoint requests sent, retries included.
	pub fn network_exchanges(&self) -> u64 {
		self.network_exchanges.load(Ordering::Relaxed)
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_success(&self) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal(&self) {
		self.renewals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_silent_renewal(&self) {
		self.silent_renewals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_network_exchange(&self) {
		self.network_exchanges.fetch_add(1, Ordering::Relaxed);
	}
}
