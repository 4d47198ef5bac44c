//! Crate-level error types shared across flows, repositories, and stores.
//!
//! [`Error`] is `Clone` so a single in-flight exchange can hand the same outcome to every
//! waiter; boxed sources are therefore reference counted.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or client-side URL problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Authorization callback failed validation.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// Token endpoint explicitly rejected the grant.
	#[error("Token endpoint rejected the grant ({code}): {reason}.")]
	GrantRejected {
		/// Recognized protocol error code.
		code: GrantErrorCode,
		/// Provider-supplied reason string.
		reason: String,
	},
	/// An API rejected the bearer token (HTTP 401).
	#[error("API rejected the access token: {reason}.")]
	Unauthorized {
		/// Caller-supplied reason string.
		reason: String,
	},
	/// No usable token could be produced.
	#[error("No token is available: {reason}.")]
	TokenUnavailable {
		/// Why the token is unavailable.
		reason: String,
	},
	/// The user dismissed the interactive login.
	#[error("Authorization was cancelled by the user.")]
	CancelledByUser,
	/// The operation was cancelled through a repository reset.
	#[error("Operation was cancelled.")]
	Cancelled,
	/// A redirect chain ended without the data needed to finish authorization.
	#[error("Authorization redirect did not carry the expected data: {reason}.")]
	DataMissing {
		/// Description of what was missing.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the retry policy may attempt the operation again.
	///
	/// Network failures and HTTP status errors other than 401 qualify.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Transient(err) => err.is_retryable(),
			_ => false,
		}
	}

	/// Returns `true` when the token endpoint rejected the grant itself.
	pub fn is_grant_rejection(&self) -> bool {
		matches!(self, Self::GrantRejected { .. })
	}

	/// HTTP status code attached to the failure, when known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Transient(err) => err.status(),
			_ => None,
		}
	}
}

/// Protocol error codes that mean the presented grant is no longer usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantErrorCode {
	/// `invalid_grant`: the code or refresh token is invalid, expired, or revoked.
	InvalidGrant,
	/// `invalid_request`: the request is malformed for the presented grant.
	InvalidRequest,
	/// `token_inactive`: the refresh token has been deactivated.
	TokenInactive,
}
impl GrantErrorCode {
	/// Parses the OAuth `error` field, returning `None` for codes outside this set.
	pub fn from_oauth_error(value: &str) -> Option<Self> {
		if value.eq_ignore_ascii_case("invalid_grant") {
			Some(Self::InvalidGrant)
		} else if value.eq_ignore_ascii_case("invalid_request") {
			Some(Self::InvalidRequest)
		} else if value.eq_ignore_ascii_case("token_inactive") {
			Some(Self::TokenInactive)
		} else {
			None
		}
	}

	/// Returns the wire identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InvalidGrant => "invalid_grant",
			Self::InvalidRequest => "invalid_request",
			Self::TokenInactive => "token_inactive",
		}
	}
}
impl Display for GrantErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failures raised while validating an authorization callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ValidationError {
	/// Returned `state` differs from the attempt's state (possible replay or CSRF).
	#[error("Authorization state mismatch.")]
	StateMismatch,
	/// Redirect carried neither an error nor an authorization code.
	#[error("Authorization redirect carried no authorization code.")]
	AuthorizationCodeMissing,
	/// The user or server denied access.
	#[error("Access was denied.")]
	AccessDenied,
	/// The account is blocked.
	#[error("The user account is blocked.")]
	UserBlocked,
	/// Authorization server reported another error.
	#[error(
		"Authorization server returned {code}: {}.",
		.description.as_deref().unwrap_or("no description")
	)]
	AuthApi {
		/// OAuth `error` code.
		code: String,
		/// Optional OAuth `error_description`.
		description: Option<String>,
	},
}

/// Configuration and client-side URL failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// Client configuration failed validation.
	#[error(transparent)]
	Client(#[from] crate::config::ClientConfigError),
	/// Configured endpoint cannot be used by the token client.
	#[error("Configured endpoint is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A `Location` header could not be resolved against the current URL.
	#[error("Redirect target `{location}` is not a valid URL.")]
	InvalidRedirectTarget {
		/// Raw `Location` header value.
		location: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request scopes or audiences cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token builder validation failed.
	#[error("Unable to build auth token.")]
	TokenBuild(#[from] crate::auth::AuthTokenBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants.
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	/// HTTP status code captured alongside the failure.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::TokenResponseParse { status, .. } => *status,
		}
	}

	/// 401 and successful statuses are not worth retrying; everything else is.
	pub fn is_retryable(&self) -> bool {
		match self.status() {
			Some(401) => false,
			Some(code) => !(200..300).contains(&code),
			None => true,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while contacting the authorization server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while contacting the authorization server.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
