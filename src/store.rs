//! Storage contracts and built-in store implementations for granted tokens.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::AuthToken};

/// Boxed future returned by [`AuthTokenStorage`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Secure key-value storage for granted tokens.
///
/// Keys are arbitrary strings. Repositories use one fixed key for the identity slot and one
/// [`storage_key`](crate::auth::AccessTokenRequest::storage_key) per access-token request.
/// Implementations must replace values atomically so readers never observe a partial token.
pub trait AuthTokenStorage
where
	Self: Send + Sync,
{
	/// Fetches the token stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AuthToken>>;

	/// Replaces the token under `key`; `None` deletes the entry.
	fn set<'a>(&'a self, key: &'a str, token: Option<AuthToken>) -> StoreFuture<'a, ()>;

	/// Returns true when no tokens are stored.
	fn is_empty(&self) -> StoreFuture<'_, bool>;

	/// Deletes every stored token.
	fn remove_all(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`AuthTokenStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
