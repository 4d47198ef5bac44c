//! Client configuration and requester-side collaborators.
//!
//! [`ClientConfig`] replaces ambient global settings: it is validated once by
//! [`ClientConfigBuilder`] and then shared by the PKCE builder, the token facade, and the
//! repositories.

// std
use std::net::IpAddr;
// self
use crate::_prelude::*;

/// Errors raised while constructing or validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// Client identifier is required.
	#[error("Missing client identifier.")]
	MissingClientId,
	/// Authorization endpoint is required for PKCE renewals.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory for all exchanges.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Redirect URI is required to recognize authorization callbacks.
	#[error("Missing redirect URI.")]
	MissingRedirectUri,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// PKCE verifier length outside the 43..=128 range.
	#[error("The PKCE verifier length must be between 43 and 128, got {len}.")]
	InvalidVerifierLength {
		/// Rejected length.
		len: usize,
	},
	/// State and nonce must not be empty.
	#[error("The {field} length must be positive.")]
	EmptyRandomValue {
		/// Which value was configured empty.
		field: &'static str,
	},
	/// Retry intervals must be ordered and non-zero.
	#[error("Retry configuration is invalid: {reason}.")]
	InvalidRetry {
		/// Description of the violated constraint.
		reason: &'static str,
	},
}

/// Lengths of the random values generated for each authorization attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkceConfig {
	/// Length of the `state` value.
	pub state_len: usize,
	/// Length of the `nonce` value.
	pub nonce_len: usize,
	/// Length of the PKCE code verifier.
	pub verifier_len: usize,
}
impl PkceConfig {
	/// Shortest verifier allowed by RFC 7636.
	pub const MIN_VERIFIER_LEN: usize = 43;
	/// Longest verifier allowed by RFC 7636.
	pub const MAX_VERIFIER_LEN: usize = 128;
}
impl Default for PkceConfig {
	fn default() -> Self {
		Self { state_len: 8, nonce_len: 8, verifier_len: Self::MAX_VERIFIER_LEN }
	}
}

/// Backoff parameters, expressed in milliseconds for serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// First retry delay.
	pub start_interval_ms: u64,
	/// Amount added to the delay for each subsequent retry.
	pub increase_interval_ms: u64,
	/// Cap on a single retry delay.
	pub max_interval_ms: u64,
	/// Total budget measured from the first attempt.
	pub max_combined_timeout_ms: u64,
}
impl RetryConfig {
	/// Configuration that never retries.
	pub const fn disabled() -> Self {
		Self {
			start_interval_ms: 0,
			increase_interval_ms: 0,
			max_interval_ms: 0,
			max_combined_timeout_ms: 0,
		}
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			start_interval_ms: 1_000,
			increase_interval_ms: 1_000,
			max_interval_ms: 5_000,
			max_combined_timeout_ms: 12_000,
		}
	}
}

/// Validated client settings shared by every flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Public client identifier.
	pub client_id: String,
	/// Authorization endpoint used to start PKCE renewals.
	pub authorization_endpoint: Url,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Url,
	/// Redirect URI registered for the client.
	pub redirect_uri: Url,
	/// Random value lengths.
	pub pkce: PkceConfig,
	/// Backoff parameters.
	pub retry: RetryConfig,
	/// Whether access-token renewals first obtain an ID token to send as `id_token_hint`.
	pub require_id_token_hint: bool,
	/// Storage key of the identity token slot.
	pub identity_storage_key: String,
	/// Upper bound on redirects followed during silent renewal.
	pub max_redirects: usize,
}
impl ClientConfig {
	/// Default storage key of the identity token slot.
	pub const DEFAULT_IDENTITY_STORAGE_KEY: &'static str = "identity_token";
	/// Default redirect bound for silent renewal.
	pub const DEFAULT_MAX_REDIRECTS: usize = 10;

	/// Creates a new builder for the provided client identifier.
	pub fn builder(client_id: impl Into<String>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(client_id)
	}

	fn validate(&self) -> Result<(), ClientConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ClientConfigError::MissingClientId);
		}

		validate_endpoint("authorization", &self.authorization_endpoint)?;
		validate_endpoint("token", &self.token_endpoint)?;

		let verifier_len = self.pkce.verifier_len;

		if !(PkceConfig::MIN_VERIFIER_LEN..=PkceConfig::MAX_VERIFIER_LEN).contains(&verifier_len) {
			return Err(ClientConfigError::InvalidVerifierLength { len: verifier_len });
		}
		if self.pkce.state_len == 0 {
			return Err(ClientConfigError::EmptyRandomValue { field: "state" });
		}
		if self.pkce.nonce_len == 0 {
			return Err(ClientConfigError::EmptyRandomValue { field: "nonce" });
		}
		if self.retry.start_interval_ms > self.retry.max_interval_ms {
			return Err(ClientConfigError::InvalidRetry {
				reason: "start interval exceeds max interval",
			});
		}

		Ok(())
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	client_id: String,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	redirect_uri: Option<Url>,
	pkce: PkceConfig,
	retry: RetryConfig,
	require_id_token_hint: bool,
	identity_storage_key: String,
	max_redirects: usize,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided client identifier.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			redirect_uri: None,
			pkce: PkceConfig::default(),
			retry: RetryConfig::default(),
			require_id_token_hint: false,
			identity_storage_key: ClientConfig::DEFAULT_IDENTITY_STORAGE_KEY.into(),
			max_redirects: ClientConfig::DEFAULT_MAX_REDIRECTS,
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Overrides the random value lengths.
	pub fn pkce(mut self, pkce: PkceConfig) -> Self {
		self.pkce = pkce;

		self
	}

	/// Overrides the backoff parameters.
	pub fn retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;

		self
	}

	/// Enables the ID token hint on access-token renewals.
	pub fn require_id_token_hint(mut self, enabled: bool) -> Self {
		self.require_id_token_hint = enabled;

		self
	}

	/// Overrides the identity token storage key.
	pub fn identity_storage_key(mut self, key: impl Into<String>) -> Self {
		self.identity_storage_key = key.into();

		self
	}

	/// Overrides the silent renewal redirect bound.
	pub fn max_redirects(mut self, max: usize) -> Self {
		self.max_redirects = max;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let authorization_endpoint = self
			.authorization_endpoint
			.ok_or(ClientConfigError::MissingAuthorizationEndpoint)?;
		let token_endpoint = self.token_endpoint.ok_or(ClientConfigError::MissingTokenEndpoint)?;
		let redirect_uri = self.redirect_uri.ok_or(ClientConfigError::MissingRedirectUri)?;
		let config = ClientConfig {
			client_id: self.client_id,
			authorization_endpoint,
			token_endpoint,
			redirect_uri,
			pkce: self.pkce,
			retry: self.retry,
			require_id_token_hint: self.require_id_token_hint,
			identity_storage_key: self.identity_storage_key,
			max_redirects: self.max_redirects,
		};

		config.validate()?;

		Ok(config)
	}
}

/// Supplies per-user context for authorization requests.
pub trait RequesterContext
where
	Self: Send + Sync,
{
	/// Language code sent as `ui_locales`.
	fn language_code(&self) -> String;

	/// Fallback `login_hint` used when no previous ID token names the subject.
	fn login_hint(&self) -> Option<String> {
		None
	}
}

/// [`RequesterContext`] backed by fixed values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRequesterContext {
	/// Language code sent as `ui_locales`.
	pub language_code: String,
	/// Optional fallback login hint.
	pub login_hint: Option<String>,
}
impl StaticRequesterContext {
	/// Creates a context with the provided language and no login hint.
	pub fn new(language_code: impl Into<String>) -> Self {
		Self { language_code: language_code.into(), login_hint: None }
	}

	/// Sets the fallback login hint.
	pub fn with_login_hint(mut self, hint: impl Into<String>) -> Self {
		self.login_hint = Some(hint.into());

		self
	}
}
impl Default for StaticRequesterContext {
	fn default() -> Self {
		Self::new("en")
	}
}
impl RequesterContext for StaticRequesterContext {
	fn language_code(&self) -> String {
		self.language_code.clone()
	}

	fn login_hint(&self) -> Option<String> {
		self.login_hint.clone()
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ClientConfigError> {
	if url.scheme() == "https" || is_loopback(url) {
		Ok(())
	} else {
		Err(ClientConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}
