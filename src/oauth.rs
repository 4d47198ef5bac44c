//! Token endpoint facade built on the `oauth2` crate.
//!
//! The facade configures a public client (no secret, `client_id` in the form body) and exposes
//! the two grants the lifecycle needs: refresh token and authorization code with PKCE.
//! Responses are decoded into [`AuthToken`] values, including the OIDC `id_token` extension
//! field.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, Client, ClientId, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthCode, AuthToken, TokenSecret},
	config::ClientConfig,
	error::{ConfigError, GrantErrorCode, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};
#[cfg(feature = "reqwest")] use crate::error::TransportError;

/// OIDC extension fields carried by token responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Raw ID token, present when the `openid` scope was granted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Token response shape returned by the token endpoint.
pub type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type ConfiguredClient = Client<
	BasicErrorResponse,
	IdTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
type FacadeRequestError<E> = BasicRequestTokenError<HttpClientError<E>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown transport failure"),
		}
	}
}

pub(crate) trait OAuth2Facade
where
	Self: Send + Sync,
{
	fn refresh_token<'a>(&'a self, refresh_token: &'a TokenSecret) -> FacadeFuture<'a, AuthToken>;

	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a AuthCode,
	) -> FacadeFuture<'a, AuthToken>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &ClientConfig,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(config.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let oauth_client = Client::new(ClientId::new(config.client_id.clone()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	fn map_error(
		&self,
		meta: Option<ResponseMetadata>,
		err: FacadeRequestError<C::TransportError>,
	) -> Error {
		map_request_error(meta, err, self.error_mapper.as_ref())
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh_token<'a>(&'a self, refresh_token: &'a TokenSecret) -> FacadeFuture<'a, AuthToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(meta.take(), err))?;

			map_token_response(response, Some(refresh_token))
		})
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a AuthCode,
	) -> FacadeFuture<'a, AuthToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(code.redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.code.clone()))
				.set_pkce_verifier(PkceCodeVerifier::new(code.code_verifier.clone()))
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(meta.take(), err))?;

			map_token_response(response, None)
		})
	}
}

fn map_token_response(
	response: IdTokenResponse,
	previous_refresh: Option<&TokenSecret>,
) -> Result<AuthToken> {
	let granted_at = OffsetDateTime::now_utc();
	let mut builder = AuthToken::builder()
		.access_token(response.access_token().secret().to_owned())
		.granted_at(granted_at);

	if let Some(expires_in) = response.expires_in() {
		let seconds =
			i64::try_from(expires_in.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if seconds <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		let lifetime = Duration::seconds(seconds);

		if granted_at.checked_add(lifetime).is_none() {
			return Err(ConfigError::ExpiresInOutOfRange.into());
		}

		builder = builder.expires_in(lifetime);
	}
	if let Some(id_token) = response.extra_fields().id_token.as_ref() {
		builder = builder.id_token(id_token.clone());
	}

	builder = match response.refresh_token() {
		Some(rotated) => builder.refresh_token(rotated.secret().to_owned()),
		None => builder.refresh_secret(previous_refresh.cloned()),
	};

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: FacadeRequestError<E>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, _body) => TransientError::TokenResponseParse {
			source: Arc::new(error),
			status: meta_status(meta_ref),
		}
		.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref();
	let reason = response.error_description().cloned().unwrap_or_else(|| code.to_owned());

	match GrantErrorCode::from_oauth_error(code) {
		Some(code) => Error::GrantRejected { code, reason },
		None => TransientError::TokenEndpoint {
			message: format!("{code}: {reason}"),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
