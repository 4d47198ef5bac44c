//! Thread-safe in-memory [`AuthTokenStorage`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::AuthToken,
	store::{AuthTokenStorage, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, AuthToken>>>;

/// Storage backend that keeps tokens in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns a snapshot of the stored keys, sorted.
	pub fn keys(&self) -> Vec<String> {
		let mut keys = self.0.read().keys().cloned().collect::<Vec<_>>();

		keys.sort();

		keys
	}

	fn set_now(map: StoreMap, key: String, token: Option<AuthToken>) -> Result<(), StoreError> {
		let mut guard = map.write();

		match token {
			Some(token) => {
				guard.insert(key, token);
			},
			None => {
				guard.remove(&key);
			},
		}

		Ok(())
	}
}
impl AuthTokenStorage for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AuthToken>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, token: Option<AuthToken>) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::set_now(map, key, token) })
	}

	fn is_empty(&self) -> StoreFuture<'_, bool> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().is_empty()) })
	}

	fn remove_all(&self) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().clear();

			Ok(())
		})
	}
}
