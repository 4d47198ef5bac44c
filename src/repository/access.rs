// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRequest, AuthToken, TokenSecret},
	repository::{IdentityTokenRepository, TokenExchanger},
	single_flight::SingleFlightExecutor,
};

/// Repository for access tokens scoped to audiences and scopes.
///
/// Each distinct [`storage_key`](AccessTokenRequest::storage_key) is cached and deduplicated
/// on its own. When [`ClientConfig::require_id_token_hint`](crate::config::ClientConfig) is
/// set, renewals first obtain an ID token through the wrapped identity layer and send it as
/// `id_token_hint`.
#[derive(Clone, Debug)]
pub struct AccessTokenRepository {
	identity: IdentityTokenRepository,
	flights: Arc<SingleFlightExecutor<String, AuthToken>>,
}
impl AccessTokenRepository {
	/// Wraps `exchanger` with the access-token caching rule and its own identity layer.
	pub fn new(exchanger: TokenExchanger) -> Self {
		Self::with_identity(IdentityTokenRepository::new(exchanger))
	}

	/// Builds on an existing identity layer, sharing its exchanger and in-flight state.
	pub fn with_identity(identity: IdentityTokenRepository) -> Self {
		Self { identity, flights: Default::default() }
	}

	/// Identity layer used for ID token hints.
	pub fn identity(&self) -> &IdentityTokenRepository {
		&self.identity
	}

	/// Underlying exchanger.
	pub fn exchanger(&self) -> &TokenExchanger {
		self.identity.exchanger()
	}

	/// Returns the access token for `request`.
	pub async fn access_token(&self, request: &AccessTokenRequest) -> Result<TokenSecret> {
		Ok(self.auth_token(request).await?.access_token)
	}

	/// Returns `"Bearer <access token>"` for `request`.
	pub async fn bearer_header(&self, request: &AccessTokenRequest) -> Result<String> {
		Ok(self.access_token(request).await?.bearer())
	}

	/// Returns the full token set for `request`, refreshing or renewing on a cache miss.
	///
	/// [`OneTime`](crate::auth::PersistenceStrategy::OneTime) requests skip the cache and are
	/// never persisted.
	pub async fn auth_token(&self, request: &AccessTokenRequest) -> Result<AuthToken> {
		let key = request.storage_key();

		if request.is_persisted() {
			let stored = self.exchanger().load(&key).await?;

			if let Some(token) = stored.filter(|token| !token.is_expired()) {
				return Ok(token);
			}
		}

		let identity = self.identity.clone();
		let request = request.clone();

		self.flights
			.perform_task(key.clone(), move |cancel| async move {
				let exchanger = identity.exchanger();
				let stored =
					if request.is_persisted() { exchanger.load(&key).await? } else { None };

				if let Some(token) = stored.as_ref().filter(|token| !token.is_expired()) {
					return Ok(token.clone());
				}

				let token = match stored.and_then(|token| token.refresh_token) {
					Some(refresh_token) => exchanger.refresh(&key, &refresh_token).await?,
					None => {
						let hint = if exchanger.config().require_id_token_hint {
							Some(identity.id_token().await?)
						} else {
							None
						};

						exchanger.renew(&request, hint.as_ref()).await?
					},
				};

				exchanger.commit(&key, &request, token, &cancel).await
			})
			.await
	}

	/// Marks the cached token for `request` expired; its refresh token is kept.
	pub async fn expire(&self, request: &AccessTokenRequest) -> Result<()> {
		self.exchanger().expire(&request.storage_key()).await
	}

	/// Runs `operation` with an access token, retrying once with a new token on
	/// [`Error::Unauthorized`].
	///
	/// The first rejection expires the cached token locally so the retry refreshes. A second
	/// rejection surfaces.
	pub async fn with_access_token<T, F, Fut>(
		&self,
		request: &AccessTokenRequest,
		mut operation: F,
	) -> Result<T>
	where
		F: FnMut(TokenSecret) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let token = self.access_token(request).await?;

		match operation(token).await {
			Err(Error::Unauthorized { .. }) => {
				self.expire(request).await?;

				let token = self.access_token(request).await?;

				operation(token).await
			},
			outcome => outcome,
		}
	}

	/// Cancels in-flight access-token exchanges, then the identity layer's.
	pub fn reset(&self) {
		self.flights.cancel_tasks();
		self.identity.reset();
	}

	/// Resets both layers, removes every stored token, and clears cookies.
	pub async fn logout(&self) -> Result<()> {
		self.reset();
		self.exchanger().remove_all().await
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures::future;
	// self
	use super::*;
	use crate::{
		auth::JwtToken,
		cookies::{CookiesManager, HttpCookie},
		error::{GrantErrorCode, TransientError},
		repository::fixtures::{self, ApprovingPresenter, ScriptedFacade},
		store::AuthTokenStorage,
	};

	fn request() -> AccessTokenRequest {
		AccessTokenRequest::from_values(["api.example.com"], ["read", "write"])
			.expect("Request fixture should be valid.")
	}

	#[tokio::test]
	async fn cached_token_skips_the_network() {
		let facade = Arc::new(ScriptedFacade::default());
		let (exchanger, store, _) = fixtures::exchanger(facade.clone(), false);
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::token("cached", None, Duration::hours(1))))
			.await
			.expect("Seeding storage should succeed.");

		let header = AccessTokenRepository::new(exchanger)
			.bearer_header(&request)
			.await
			.expect("Cached token should be returned.");

		assert_eq!(header, "Bearer cached");
		assert_eq!(facade.calls(), 0);
	}

	#[tokio::test]
	async fn expired_token_is_refreshed_and_persisted() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.refresh_with(Ok(fixtures::token("fresh", Some("r1"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade.clone(), false);
		let metrics = exchanger.metrics();
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::expired("stale", Some("r1"))))
			.await
			.expect("Seeding storage should succeed.");

		let token = AccessTokenRepository::new(exchanger)
			.access_token(&request)
			.await
			.expect("Refresh should succeed.");
		let persisted = store
			.get(&request.storage_key())
			.await
			.expect("Reading storage should succeed.")
			.expect("Refreshed token should be persisted.");

		assert_eq!(token.expose(), "fresh");
		assert_eq!(persisted.access_token.expose(), "fresh");
		assert_eq!(metrics.refresh_attempts(), 1);
		assert_eq!(metrics.refresh_successes(), 1);
		assert_eq!(metrics.network_exchanges(), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.with_latency(std::time::Duration::from_millis(50))
				.refresh_with(Ok(fixtures::token("shared", Some("r1"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade.clone(), false);
		let repository = AccessTokenRepository::new(exchanger);
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::expired("stale", Some("r1"))))
			.await
			.expect("Seeding storage should succeed.");

		let results = future::join_all((0..6).map(|_| repository.access_token(&request))).await;

		assert_eq!(facade.calls(), 1);

		for result in results {
			assert_eq!(result.expect("Every caller should receive the token.").expose(), "shared");
		}
	}

	#[tokio::test]
	async fn rejected_refresh_clears_the_refresh_token() {
		let facade = Arc::new(ScriptedFacade::default().refresh_with(Err(Error::GrantRejected {
			code: GrantErrorCode::InvalidGrant,
			reason: "expired".into(),
		})));
		let (exchanger, store, _) = fixtures::exchanger(facade, false);
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::expired("stale", Some("r1"))))
			.await
			.expect("Seeding storage should succeed.");

		let err = AccessTokenRepository::new(exchanger)
			.access_token(&request)
			.await
			.expect_err("Rejection should surface.");
		let stored = store
			.get(&request.storage_key())
			.await
			.expect("Reading storage should succeed.")
			.expect("Token entry should remain.");

		assert!(err.is_grant_rejection());
		assert!(stored.refresh_token.is_none());
	}

	#[tokio::test]
	async fn transient_refresh_failure_keeps_the_refresh_token() {
		let facade = Arc::new(ScriptedFacade::default().refresh_with(Err(
			TransientError::TokenEndpoint {
				message: "unavailable".into(),
				status: Some(503),
				retry_after: None,
			}
			.into(),
		)));
		let (exchanger, store, _) = fixtures::exchanger(facade, false);
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::expired("stale", Some("r1"))))
			.await
			.expect("Seeding storage should succeed.");

		let err = AccessTokenRepository::new(exchanger)
			.access_token(&request)
			.await
			.expect_err("Transient failure should surface.");
		let stored = store
			.get(&request.storage_key())
			.await
			.expect("Reading storage should succeed.")
			.expect("Token entry should remain.");

		assert_eq!(err.status(), Some(503));
		assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("r1"));
	}

	#[tokio::test]
	async fn renewal_sends_id_token_hint_when_required() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.exchange_with(Ok(fixtures::token("renewed", Some("r9"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade, true);
		let presenter = Arc::new(ApprovingPresenter::default());
		let repository = AccessTokenRepository::new(exchanger.with_presenter(presenter.clone()));
		let in_an_hour = OffsetDateTime::now_utc() + Duration::hours(1);
		let raw_id = fixtures::jwt("user-42", in_an_hour);
		let mut identity = fixtures::token("identity", Some("id-refresh"), Duration::hours(1));

		identity.id_token = Some(JwtToken::new(raw_id.clone()));
		store.set("identity_token", Some(identity)).await.expect("Seeding storage should succeed.");

		let token = repository.access_token(&request()).await.expect("Renewal should succeed.");
		let attempts = presenter.attempts.lock();
		let query = attempts[0].authorize_url.query_pairs().into_owned().collect::<Vec<_>>();

		assert_eq!(token.expose(), "renewed");
		assert!(query.contains(&("id_token_hint".into(), raw_id)));
		assert!(query.contains(&("login_hint".into(), "user-42".into())));
		assert!(query.contains(&("audience".into(), "api.example.com".into())));
		assert!(query.contains(&("scope".into(), "read write".into())));
	}

	#[tokio::test]
	async fn one_time_requests_bypass_storage() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.exchange_with(Ok(fixtures::token("first", None, Duration::hours(1))))
				.exchange_with(Ok(fixtures::token("second", None, Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade, false);
		let repository = AccessTokenRepository::new(
			exchanger.with_presenter(Arc::new(ApprovingPresenter::default())),
		);
		let request = request().with_persistence(crate::auth::PersistenceStrategy::OneTime);
		let first = repository.access_token(&request).await.expect("First renewal should succeed.");
		let second =
			repository.access_token(&request).await.expect("Second renewal should succeed.");

		assert_eq!(first.expose(), "first");
		assert_eq!(second.expose(), "second");
		assert_eq!(store.len(), 0);
	}

	#[tokio::test]
	async fn unauthorized_operation_is_retried_once_with_a_refreshed_token() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.refresh_with(Ok(fixtures::token("second", Some("r1"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade.clone(), false);
		let request = request();

		store
			.set(
				&request.storage_key(),
				Some(fixtures::token("first", Some("r1"), Duration::hours(1))),
			)
			.await
			.expect("Seeding storage should succeed.");

		let seen = Mutex::new(Vec::new());
		let value = AccessTokenRepository::new(exchanger)
			.with_access_token(&request, |token| {
				seen.lock().push(token.expose().to_owned());

				let outcome = if token.expose() == "first" {
					Err(Error::Unauthorized { reason: "stale".into() })
				} else {
					Ok(7)
				};

				async move { outcome }
			})
			.await
			.expect("Retry with a fresh token should succeed.");

		assert_eq!(value, 7);
		assert_eq!(*seen.lock(), ["first", "second"]);
		assert_eq!(*facade.seen_refresh_tokens.lock(), ["r1"]);
	}

	#[tokio::test]
	async fn second_unauthorized_surfaces() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.refresh_with(Ok(fixtures::token("second", Some("r1"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade, false);
		let request = request();

		store
			.set(
				&request.storage_key(),
				Some(fixtures::token("first", Some("r1"), Duration::hours(1))),
			)
			.await
			.expect("Seeding storage should succeed.");

		let err = AccessTokenRepository::new(exchanger)
			.with_access_token(&request, |_| async {
				Err::<(), _>(Error::Unauthorized { reason: "forbidden".into() })
			})
			.await
			.expect_err("Second rejection should surface.");

		assert!(matches!(err, Error::Unauthorized { .. }));
	}

	#[tokio::test]
	async fn reset_cancels_in_flight_exchanges_without_persisting() {
		let facade = Arc::new(
			ScriptedFacade::default()
				.with_latency(std::time::Duration::from_secs(30))
				.refresh_with(Ok(fixtures::token("late", Some("r1"), Duration::hours(1)))),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade, false);
		let repository = AccessTokenRepository::new(exchanger);
		let request = request();

		store
			.set(&request.storage_key(), Some(fixtures::expired("stale", Some("r1"))))
			.await
			.expect("Seeding storage should succeed.");

		let waiter = tokio::spawn({
			let repository = repository.clone();
			let request = request.clone();

			async move { repository.access_token(&request).await }
		});

		while repository.flights.in_flight() == 0 {
			tokio::task::yield_now().await;
		}

		repository.reset();

		let outcome = waiter.await.expect("Waiter task should not panic.");
		let stored = store
			.get(&request.storage_key())
			.await
			.expect("Reading storage should succeed.")
			.expect("Seeded token should remain.");

		assert!(matches!(outcome, Err(Error::Cancelled)));
		assert_eq!(stored.access_token.expose(), "stale");
	}

	#[tokio::test]
	async fn reset_cancels_identity_exchange_behind_a_hinted_renewal() {
		let in_an_hour = OffsetDateTime::now_utc() + Duration::hours(1);
		let mut late = fixtures::token("late-id", None, Duration::hours(1));

		late.id_token = Some(JwtToken::new(fixtures::jwt("user-42", in_an_hour)));

		let facade = Arc::new(
			ScriptedFacade::default()
				.with_latency(std::time::Duration::from_secs(30))
				.refresh_with(Ok(late)),
		);
		let (exchanger, store, _) = fixtures::exchanger(facade.clone(), true);
		let repository = AccessTokenRepository::new(exchanger);
		let request = request();

		store
			.set("identity_token", Some(fixtures::expired("stale-id", Some("ri"))))
			.await
			.expect("Seeding storage should succeed.");

		let access_waiter = tokio::spawn({
			let repository = repository.clone();
			let request = request.clone();

			async move { repository.access_token(&request).await }
		});
		let identity_waiter = tokio::spawn({
			let identity = repository.identity().clone();

			async move { identity.id_token().await }
		});

		while facade.calls() == 0 {
			tokio::task::yield_now().await;
		}

		assert_eq!(repository.flights.in_flight(), 1);

		repository.reset();

		let access = access_waiter.await.expect("Access waiter should not panic.");
		let identity = identity_waiter.await.expect("Identity waiter should not panic.");

		assert!(matches!(access, Err(Error::Cancelled)));
		assert!(matches!(identity, Err(Error::Cancelled)));
		assert_eq!(repository.flights.in_flight(), 0);
		assert_eq!(facade.calls(), 1);

		let identity_slot = store
			.get("identity_token")
			.await
			.expect("Reading storage should succeed.")
			.expect("Seeded identity token should remain.");

		assert_eq!(identity_slot.access_token.expose(), "stale-id");
		assert!(
			store
				.get(&request.storage_key())
				.await
				.expect("Reading storage should succeed.")
				.is_none()
		);
	}

	#[tokio::test]
	async fn logout_clears_tokens_and_cookies() {
		let facade = Arc::new(ScriptedFacade::default());
		let (exchanger, store, cookies) = fixtures::exchanger(facade, false);
		let request = request();

		cookies.save_cookies(vec![HttpCookie::new("sid", "abc", "auth.example.com")]);
		store
			.set(&request.storage_key(), Some(fixtures::token("t", None, Duration::hours(1))))
			.await
			.expect("Seeding storage should succeed.");

		AccessTokenRepository::new(exchanger).logout().await.expect("Logout should succeed.");

		assert_eq!(store.len(), 0);
		assert!(cookies.is_empty());
	}
}
