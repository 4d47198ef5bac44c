//! Per-key request coalescing.
//!
//! Concurrent callers asking for the same key share one in-flight operation and all observe
//! its outcome. Dropping a caller's future never cancels the shared operation; only
//! [`SingleFlightExecutor::cancel_tasks`] does.

// std
use std::sync::{
	Weak,
	atomic::{AtomicBool, AtomicU64, Ordering},
};
// crates.io
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture, FutureExt, Shared};
// self
use crate::{_prelude::*, obs};

type FlightMap<K, V> = Mutex<HashMap<K, Flight<V>>>;

/// Cancellation signal handed to each operation.
///
/// Operations check it after their network exchange and before persisting anything.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);
impl CancelFlag {
	/// Returns `true` once the owning executor cancelled the operation.
	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}

	/// Fails with [`Error::Cancelled`] when the operation was cancelled.
	pub fn ensure_active(&self) -> Result<()> {
		if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}

	fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}
}

struct Flight<V> {
	id: u64,
	future: Shared<BoxFuture<'static, Result<V>>>,
	abort: AbortHandle,
	cancel: CancelFlag,
}

/// Coalesces concurrent operations by key.
pub struct SingleFlightExecutor<K, V> {
	flights: Arc<FlightMap<K, V>>,
	next_id: AtomicU64,
}
impl<K, V> SingleFlightExecutor<K, V>
where
	K: 'static + Clone + Eq + Hash + Send,
	V: 'static + Clone + Send + Sync,
{
	/// Creates an executor with nothing in flight.
	pub fn new() -> Self {
		Self { flights: Default::default(), next_id: AtomicU64::new(0) }
	}

	/// Runs `operation` for `key`, or joins the run already in flight for it.
	///
	/// `operation` is only invoked when nothing is in flight. Once the run completes the key
	/// is released, so the next call starts fresh.
	pub async fn perform_task<F, Fut>(&self, key: K, operation: F) -> Result<V>
	where
		F: FnOnce(CancelFlag) -> Fut,
		Fut: 'static + Send + Future<Output = Result<V>>,
	{
		let future = {
			let mut flights = self.flights.lock();

			match flights.get(&key) {
				Some(flight) => flight.future.clone(),
				None => {
					let flight = self.launch(key.clone(), operation);
					let future = flight.future.clone();

					flights.insert(key, flight);

					future
				},
			}
		};

		future.await
	}

	/// Cancels every in-flight operation; current waiters receive [`Error::Cancelled`].
	pub fn cancel_tasks(&self) {
		let cancelled = self.flights.lock().drain().map(|(_, flight)| flight).collect::<Vec<_>>();

		obs::flights_cancelled(cancelled.len());

		for flight in cancelled {
			flight.cancel.cancel();
			flight.abort.abort();
		}
	}

	/// Number of keys with an operation in flight.
	pub fn in_flight(&self) -> usize {
		self.flights.lock().len()
	}

	fn launch<F, Fut>(&self, key: K, operation: F) -> Flight<V>
	where
		F: FnOnce(CancelFlag) -> Fut,
		Fut: 'static + Send + Future<Output = Result<V>>,
	{
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let cancel = CancelFlag::default();
		let (abort, registration) = AbortHandle::new_pair();
		let operation = Abortable::new(operation(cancel.clone()), registration);
		let flights: Weak<FlightMap<K, V>> = Arc::downgrade(&self.flights);
		let future = async move {
			let outcome = match operation.await {
				Ok(outcome) => outcome,
				Err(Aborted) => Err(Error::Cancelled),
			};

			if let Some(flights) = flights.upgrade() {
				let mut flights = flights.lock();

				if flights.get(&key).is_some_and(|flight| flight.id == id) {
					flights.remove(&key);
				}
			}

			outcome
		}
		.boxed()
		.shared();

		Flight { id, future, abort, cancel }
	}
}
impl<K, V> Default for SingleFlightExecutor<K, V>
where
	K: 'static + Clone + Eq + Hash + Send,
	V: 'static + Clone + Send + Sync,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, V> Debug for SingleFlightExecutor<K, V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let in_flight = self.flights.lock().len();

		f.debug_struct("SingleFlightExecutor").field("in_flight", &in_flight).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// crates.io
	use futures::future;
	use tokio::time;
	// self
	use super::*;

	fn counted(
		calls: &Arc<AtomicUsize>,
		outcome: Result<u32>,
	) -> impl FnOnce(CancelFlag) -> BoxFuture<'static, Result<u32>> {
		let calls = calls.clone();

		move |_| {
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				time::sleep(std::time::Duration::from_millis(20)).await;

				outcome
			}
			.boxed()
		}
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_run() {
		let executor = SingleFlightExecutor::<String, u32>::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let results = future::join_all(
			(0..8).map(|n| executor.perform_task("key".into(), counted(&calls, Ok(n)))),
		)
		.await;

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(results.iter().all(|result| matches!(result, Ok(0))));
		assert_eq!(executor.in_flight(), 0);
	}

	#[tokio::test]
	async fn errors_fan_out_and_release_the_key() {
		let executor = SingleFlightExecutor::<String, u32>::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let failure = Err(Error::TokenUnavailable { reason: "offline".into() });
		let results = future::join_all(
			(0..3).map(|_| executor.perform_task("key".into(), counted(&calls, failure.clone()))),
		)
		.await;

		assert!(results.iter().all(|result| matches!(result, Err(Error::TokenUnavailable { .. }))));

		let value = executor
			.perform_task("key".into(), counted(&calls, Ok(7)))
			.await
			.expect("A fresh run should start after the failure.");

		assert_eq!(value, 7);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn different_keys_run_independently() {
		let executor = SingleFlightExecutor::<String, u32>::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let (a, b) = future::join(
			executor.perform_task("a".into(), counted(&calls, Ok(1))),
			executor.perform_task("b".into(), counted(&calls, Ok(2))),
		)
		.await;

		assert_eq!(a.expect("Key a should succeed."), 1);
		assert_eq!(b.expect("Key b should succeed."), 2);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn cancel_tasks_reaches_every_waiter() {
		let executor = Arc::new(SingleFlightExecutor::<String, u32>::new());
		let observed_flag = Arc::new(Mutex::new(None::<CancelFlag>));
		let spawn_waiter = |executor: Arc<SingleFlightExecutor<String, u32>>| {
			let observed_flag = observed_flag.clone();

			tokio::spawn(async move {
				executor
					.perform_task("key".into(), move |cancel| {
						*observed_flag.lock() = Some(cancel);

						future::pending::<Result<u32>>()
					})
					.await
			})
		};
		let first = spawn_waiter(executor.clone());
		let second = spawn_waiter(executor.clone());

		while executor.in_flight() == 0 {
			tokio::task::yield_now().await;
		}

		time::sleep(std::time::Duration::from_millis(10)).await;
		executor.cancel_tasks();

		for waiter in [first, second] {
			let outcome = waiter.await.expect("Waiter task should not panic.");

			assert!(matches!(outcome, Err(Error::Cancelled)));
		}

		let flag = observed_flag.lock().clone().expect("Operation should have started.");

		assert!(flag.is_cancelled());
		assert!(matches!(flag.ensure_active(), Err(Error::Cancelled)));
		assert_eq!(executor.in_flight(), 0);
	}
}
