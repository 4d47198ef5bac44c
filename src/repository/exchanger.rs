//! Refresh and renew primitives shared by both repository layers.

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRequest, AuthCode, AuthToken, JwtToken, TokenSecret},
	config::{ClientConfig, RequesterContext, StaticRequesterContext},
	cookies::CookiesManager,
	flows::{
		AuthorizationAttempt, LoginPresenter, PkceFlowBuilder, RetryPolicy, SilentRenewalSession,
	},
	http::{RedirectHttpClient, TokenHttpClient},
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	repository::ExchangeMetrics,
	single_flight::CancelFlag,
	store::AuthTokenStorage,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Performs token endpoint exchanges and owns every collaborator they need.
///
/// The exchanger is cheap to clone; clones share storage, metrics, and the storage guard.
/// Repositories wrap it with their caching policy and single-flight deduplication.
#[derive(Clone)]
pub struct TokenExchanger {
	config: Arc<ClientConfig>,
	facade: Arc<dyn OAuth2Facade>,
	storage: Arc<dyn AuthTokenStorage>,
	cookies: Arc<dyn CookiesManager>,
	redirect_client: Arc<dyn RedirectHttpClient>,
	presenter: Option<Arc<dyn LoginPresenter>>,
	pkce: PkceFlowBuilder,
	retry: RetryPolicy,
	metrics: Arc<ExchangeMetrics>,
	storage_guard: Arc<AsyncMutex<()>>,
}
impl TokenExchanger {
	/// Creates an exchanger that uses `http_client` for both token requests and redirect hops.
	pub fn new<C, M>(
		config: ClientConfig,
		storage: Arc<dyn AuthTokenStorage>,
		cookies: Arc<dyn CookiesManager>,
		http_client: Arc<C>,
		mapper: Arc<M>,
	) -> Result<Self>
	where
		C: TokenHttpClient + RedirectHttpClient,
		M: TransportErrorMapper<C::TransportError>,
	{
		let facade = BasicFacade::from_config(&config, http_client.clone(), mapper)?;

		Ok(Self::from_parts(config, Arc::new(facade), storage, cookies, http_client))
	}

	pub(crate) fn from_parts(
		config: ClientConfig,
		facade: Arc<dyn OAuth2Facade>,
		storage: Arc<dyn AuthTokenStorage>,
		cookies: Arc<dyn CookiesManager>,
		redirect_client: Arc<dyn RedirectHttpClient>,
	) -> Self {
		let config = Arc::new(config);
		let pkce = PkceFlowBuilder::new(config.clone(), Arc::new(StaticRequesterContext::default()));
		let retry = RetryPolicy::from(config.retry);

		Self {
			config,
			facade,
			storage,
			cookies,
			redirect_client,
			presenter: None,
			pkce,
			retry,
			metrics: Default::default(),
			storage_guard: Default::default(),
		}
	}

	/// Installs the interactive login fallback used when silent renewal cannot finish.
	pub fn with_presenter(mut self, presenter: Arc<dyn LoginPresenter>) -> Self {
		self.presenter = Some(presenter);

		self
	}

	/// Replaces the requester context feeding `ui_locales` and `login_hint`.
	pub fn with_requester(mut self, requester: Arc<dyn RequesterContext>) -> Self {
		self.pkce = PkceFlowBuilder::new(self.config.clone(), requester);

		self
	}

	/// Uses a dedicated transport for silent renewal redirect hops.
	pub fn with_redirect_client(mut self, client: Arc<dyn RedirectHttpClient>) -> Self {
		self.redirect_client = client;

		self
	}

	/// Overrides the retry schedule derived from [`ClientConfig::retry`].
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Client configuration shared by every flow.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Exchange counters.
	pub fn metrics(&self) -> Arc<ExchangeMetrics> {
		self.metrics.clone()
	}

	/// Backing token storage.
	pub fn storage(&self) -> &Arc<dyn AuthTokenStorage> {
		&self.storage
	}

	/// Reads the token stored under `key`.
	pub(crate) async fn load(&self, key: &str) -> Result<Option<AuthToken>> {
		Ok(self.storage.get(key).await?)
	}

	/// Runs a refresh-token grant.
	///
	/// A grant rejection clears the stored refresh token for `key` before the error surfaces, so
	/// the next call renews instead.
	pub(crate) async fn refresh(
		&self,
		key: &str,
		refresh_token: &TokenSecret,
	) -> Result<AuthToken> {
		self.metrics.record_refresh_attempt();

		let facade = self.facade.as_ref();
		let metrics = self.metrics.as_ref();
		let outcome = obs::observe(
			FlowKind::Refresh,
			"refresh_token",
			self.retry.run(move || {
				metrics.record_network_exchange();
				facade.refresh_token(refresh_token)
			}),
		)
		.await;

		match outcome {
			Ok(token) => {
				self.metrics.record_refresh_success();

				Ok(token)
			},
			Err(err) => {
				self.metrics.record_refresh_failure();

				if err.is_grant_rejection() {
					self.clear_refresh_token(key).await?;
					obs::refresh_token_cleared(key, &err);
				}

				Err(err)
			},
		}
	}

	/// Runs a full renewal: silent redirect chase first, interactive login as the fallback.
	pub(crate) async fn renew(
		&self,
		request: &AccessTokenRequest,
		id_token_hint: Option<&JwtToken>,
	) -> Result<AuthToken> {
		obs::observe(FlowKind::Renewal, "renew", async move {
			self.metrics.record_renewal();

			let attempt = self.pkce.build(request, id_token_hint);
			let code = match self.silent(&attempt).await {
				Ok(Some(code)) => {
					self.metrics.record_silent_renewal();

					code
				},
				Ok(None) => self.interactive(&attempt, None).await?,
				Err(err @ Error::DataMissing { .. }) => {
					obs::silent_renewal_unavailable(&err);

					self.interactive(&attempt, Some(err)).await?
				},
				Err(err) => return Err(err),
			};

			self.exchange(&code).await
		})
		.await
	}

	/// Persists `token` for `request` unless the operation was cancelled first.
	pub(crate) async fn commit(
		&self,
		key: &str,
		request: &AccessTokenRequest,
		token: AuthToken,
		cancel: &CancelFlag,
	) -> Result<AuthToken> {
		cancel.ensure_active()?;

		if request.is_persisted() {
			let _guard = self.storage_guard.lock().await;

			self.storage.set(key, Some(token.clone())).await?;
		}

		Ok(token)
	}

	/// Drops the refresh token stored under `key`, keeping the rest of the token.
	pub(crate) async fn clear_refresh_token(&self, key: &str) -> Result<()> {
		let _guard = self.storage_guard.lock().await;

		match self.storage.get(key).await? {
			Some(token) if token.refresh_token.is_some() => {
				self.storage.set(key, Some(token.without_refresh_token())).await?;
			},
			_ => (),
		}

		Ok(())
	}

	/// Marks the token stored under `key` as expired while keeping its refresh token.
	pub(crate) async fn expire(&self, key: &str) -> Result<()> {
		let _guard = self.storage_guard.lock().await;

		if let Some(mut token) = self.storage.get(key).await? {
			token.expire();
			self.storage.set(key, Some(token)).await?;
		}

		Ok(())
	}

	/// Deletes every stored token and cookie.
	pub(crate) async fn remove_all(&self) -> Result<()> {
		{
			let _guard = self.storage_guard.lock().await;

			self.storage.remove_all().await?;
		}

		self.cookies.clear_cookies();

		Ok(())
	}

	async fn silent(&self, attempt: &AuthorizationAttempt) -> Result<Option<AuthCode>> {
		SilentRenewalSession::new(
			self.redirect_client.clone(),
			self.cookies.clone(),
			self.config.max_redirects,
		)
		.execute(attempt)
		.await
	}

	async fn interactive(
		&self,
		attempt: &AuthorizationAttempt,
		silent_failure: Option<Error>,
	) -> Result<AuthCode> {
		let Some(presenter) = self.presenter.as_ref() else {
			return Err(silent_failure.unwrap_or_else(|| Error::TokenUnavailable {
				reason: "silent renewal is unavailable and no login presenter is configured".into(),
			}));
		};

		obs::observe(FlowKind::Interactive, "present", async move {
			let callback = presenter.present(attempt).await?;

			match attempt.validate(&callback) {
				Some(outcome) => Ok(outcome?),
				None => Err(Error::DataMissing {
					reason: format!("presenter returned {callback}, not the redirect URI"),
				}),
			}
		})
		.await
	}

	async fn exchange(&self, code: &AuthCode) -> Result<AuthToken> {
		let facade = self.facade.as_ref();
		let metrics = self.metrics.as_ref();

		obs::observe(
			FlowKind::CodeExchange,
			"exchange_authorization_code",
			self.retry.run(move || {
				metrics.record_network_exchange();
				facade.exchange_authorization_code(code)
			}),
		)
		.await
	}
}
#[cfg(feature = "reqwest")]
impl TokenExchanger {
	/// Creates an exchanger backed by a fresh non-redirecting reqwest client.
	pub fn with_reqwest(
		config: ClientConfig,
		storage: Arc<dyn AuthTokenStorage>,
		cookies: Arc<dyn CookiesManager>,
	) -> Result<Self> {
		let client = Arc::new(ReqwestHttpClient::new()?);

		Self::new(config, storage, cookies, client, Arc::new(ReqwestTransportErrorMapper))
	}
}
impl Debug for TokenExchanger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchanger")
			.field("client_id", &self.config.client_id)
			.field("presenter_set", &self.presenter.is_some())
			.field("retry", &self.retry)
			.finish()
	}
}
