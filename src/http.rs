//! Transport primitives for token exchanges and redirect interception.
//!
//! Two seams live here:
//!
//! - [`TokenHttpClient`] drives POSTs to the token endpoint through the `oauth2` crate. It comes
//!   with [`ResponseMetadata`] and [`ResponseMetadataSlot`] so failures keep their HTTP status and
//!   `Retry-After` hint. Implementations call [`ResponseMetadataSlot::take`] before dispatching a
//!   request and [`ResponseMetadataSlot::store`] once the status is known.
//! - [`RedirectHttpClient`] performs single, non-following GETs so silent renewal can inspect
//!   every `Location` before it is followed.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")]
use reqwest::{
	cookie::Cookie,
	header::{COOKIE, HeaderMap, LOCATION, RETRY_AFTER},
	redirect::Policy,
};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, cookies::HttpCookie};
#[cfg(feature = "reqwest")]
use crate::error::{ConfigError, TransportError};

/// Boxed future returned by [`RedirectHttpClient::fetch`].
pub type HopFuture<'a> = Pin<Box<dyn Future<Output = Result<Hop>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing token exchanges while publishing
/// response metadata for error classification.
///
/// Callers provide an implementation (typically behind `Arc<T>`) and the token facade requests
/// short-lived [`AsyncHttpClient`] handles that each carry a clone of a
/// [`ResponseMetadataSlot`]. Handles must own whatever state they need so their request futures
/// stay `Send` for the lifetime of the in-flight exchange.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once an HTTP response provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// One response observed while walking a redirect chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hop {
	/// URL that produced this response.
	pub url: Url,
	/// HTTP status code.
	pub status: u16,
	/// Raw `Location` header, when the response is a redirect.
	pub location: Option<String>,
	/// Cookies set by the response.
	pub cookies: Vec<HttpCookie>,
}
impl Hop {
	/// Returns the redirect target when the status is 3xx and a `Location` is present.
	pub fn redirect_location(&self) -> Option<&str> {
		if (300..400).contains(&self.status) { self.location.as_deref() } else { None }
	}
}

/// Transport that performs a single GET without following redirects.
pub trait RedirectHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Fetches `url`, attaching `cookie_header` as the `Cookie` header when present.
	///
	/// Implementations must not follow redirects; the caller inspects [`Hop::location`].
	fn fetch<'a>(&'a self, url: &'a Url, cookie_header: Option<&'a str>) -> HopFuture<'a>;
}

/// Thin wrapper around [`ReqwestClient`] shared by token exchanges and redirect interception.
///
/// The wrapped client must not follow redirects: token endpoints answer directly, and silent
/// renewal needs to see every `Location` header. [`ReqwestHttpClient::new`] configures this;
/// custom clients passed to [`ReqwestHttpClient::with_client`] must use
/// [`Policy::none`](reqwest::redirect::Policy::none) themselves.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client with redirect following disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}
#[cfg(feature = "reqwest")]
impl RedirectHttpClient for ReqwestHttpClient {
	fn fetch<'a>(&'a self, url: &'a Url, cookie_header: Option<&'a str>) -> HopFuture<'a> {
		Box::pin(async move {
			let mut request = self.0.get(url.clone());

			if let Some(header) = cookie_header {
				request = request.header(COOKIE, header);
			}

			let response = request.send().await.map_err(map_hop_error)?;
			let status = response.status().as_u16();
			let location = response
				.headers()
				.get(LOCATION)
				.and_then(|value| value.to_str().ok())
				.map(ToOwned::to_owned);
			let host = url.host_str().unwrap_or_default();
			let now = OffsetDateTime::now_utc();
			let cookies = response
				.cookies()
				.filter_map(|cookie| convert_cookie(&cookie, host, now))
				.collect();

			Ok(Hop { url: response.url().clone(), status, location, cookies })
		})
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

#[cfg(feature = "reqwest")]
/// Handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_hop_error(err: ReqwestError) -> Error {
	if err.is_builder() { ConfigError::from(err).into() } else { TransportError::from(err).into() }
}

#[cfg(feature = "reqwest")]
fn convert_cookie(
	cookie: &Cookie<'_>,
	request_host: &str,
	now: OffsetDateTime,
) -> Option<HttpCookie> {
	let expires_at = match cookie.max_age() {
		Some(max_age) => Duration::try_from(max_age).ok().and_then(|age| now.checked_add(age)),
		None => cookie.expires().map(OffsetDateTime::from),
	};
	let mut converted =
		HttpCookie::new(cookie.name(), cookie.value(), cookie.domain().unwrap_or(request_host))
			.with_path(cookie.path().unwrap_or("/"))
			.with_secure(cookie.secure());

	converted.expires_at = expires_at;

	// A `Domain` attribute must cover the responding host.
	converted.matches_host(request_host).then_some(converted)
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return i64::try_from(secs).ok().map(Duration::seconds);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(30)));

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));

		assert_eq!(parse_retry_after(&headers), None, "Oversized delays must not wrap.");
	}

	#[test]
	fn redirect_location_requires_3xx() {
		let url = Url::parse("https://auth.example.com/authorize").expect("URL should parse.");
		let mut hop = Hop { url, status: 302, location: Some("/login".into()), cookies: Vec::new() };

		assert_eq!(hop.redirect_location(), Some("/login"));

		hop.status = 200;

		assert_eq!(hop.redirect_location(), None);
	}
}
