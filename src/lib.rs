//! OAuth 2.0 / OIDC token lifecycle for public clients: cached access and ID tokens, refresh
//! with rejection-aware fallback, PKCE renewals driven by session cookies or an interactive
//! login, and per-key single-flight exchanges.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod repository;
pub mod single_flight;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use reqwest::redirect::Policy;
	// self
	use crate::{
		config::ClientConfig,
		cookies::{CookiesManager, MemoryCookies},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		repository::{AccessTokenRepository, TokenExchanger},
		store::{AuthTokenStorage, MemoryStore},
	};

	/// Builds a non-redirecting reqwest HTTP client that accepts the self-signed certificates
	/// produced by `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`TokenExchanger`] backed by in-memory storage, the provided cookies, and
	/// the reqwest transport used across integration tests.
	pub fn build_reqwest_test_exchanger(
		config: ClientConfig,
		cookies: Arc<MemoryCookies>,
	) -> (TokenExchanger, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn AuthTokenStorage> = store_backend.clone();
		let cookies: Arc<dyn CookiesManager> = cookies;
		let exchanger = TokenExchanger::new(
			config,
			store,
			cookies,
			Arc::new(test_reqwest_http_client()),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Failed to build the test token exchanger.");

		(exchanger, store_backend)
	}

	/// Constructs an [`AccessTokenRepository`] over [`build_reqwest_test_exchanger`].
	pub fn build_reqwest_test_repository(
		config: ClientConfig,
		cookies: Arc<MemoryCookies>,
	) -> (AccessTokenRepository, Arc<MemoryStore>) {
		let (exchanger, store) = build_reqwest_test_exchanger(config, cookies);

		(AccessTokenRepository::new(exchanger), store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
