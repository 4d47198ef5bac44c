//! Normalized token requests and the storage key derived from them.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ScopeValidationError},
};

/// Where a token obtained for a request is kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStrategy {
	/// Cache in [`AuthTokenStorage`](crate::store::AuthTokenStorage) and reuse until expiry.
	#[default]
	SecureStorage,
	/// Never cache; every call performs a fresh exchange.
	OneTime,
}

/// Request for a token usable against a set of audiences and scopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessTokenRequest {
	/// Audiences the token must be valid for.
	pub audiences: ScopeSet,
	/// Scopes the token must carry.
	pub scopes: ScopeSet,
	/// Caching behavior for the resulting token.
	pub persistence: PersistenceStrategy,
}
impl AccessTokenRequest {
	/// Scopes requested when only an identity (ID) token is needed.
	pub const IDENTITY_SCOPES: [&'static str; 2] = ["offline_access", "openid"];

	/// Creates a request persisted in secure storage.
	pub fn new(audiences: ScopeSet, scopes: ScopeSet) -> Self {
		Self { audiences, scopes, persistence: PersistenceStrategy::SecureStorage }
	}

	/// Normalizes raw audience and scope strings into a request.
	pub fn from_values<A, S>(audiences: A, scopes: S) -> Result<Self, ScopeValidationError>
	where
		A: IntoIterator,
		A::Item: Into<String>,
		S: IntoIterator,
		S::Item: Into<String>,
	{
		Ok(Self::new(ScopeSet::new(audiences)?, ScopeSet::new(scopes)?))
	}

	/// Request for the identity slot: `offline_access openid`, no audiences.
	pub fn identity() -> Self {
		let scopes = ScopeSet::new(Self::IDENTITY_SCOPES).unwrap_or_default();

		Self::new(ScopeSet::default(), scopes)
	}

	/// Overrides the persistence strategy.
	pub fn with_persistence(mut self, persistence: PersistenceStrategy) -> Self {
		self.persistence = persistence;

		self
	}

	/// Returns true when results should be cached.
	pub fn is_persisted(&self) -> bool {
		matches!(self.persistence, PersistenceStrategy::SecureStorage)
	}

	/// Cache and deduplication key: `"<audiences> : <scopes>"`.
	///
	/// Both halves are sorted, so requests naming the same sets in any order collide.
	pub fn storage_key(&self) -> String {
		format!("{} : {}", self.audiences, self.scopes)
	}
}
