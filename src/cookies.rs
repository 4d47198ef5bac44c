//! Browser-style cookie handling for silent renewal.
//!
//! The authorization server recognizes a returning user through its session cookies. The
//! [`CookiesManager`] owns the persisted set while [`CookieJar`] is the scratch jar used for a
//! single redirect chase.

pub mod memory;

pub use memory::MemoryCookies;

// self
use crate::_prelude::*;

/// Single cookie captured from a `Set-Cookie` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCookie {
	/// Cookie name.
	pub name: String,
	/// Cookie value.
	pub value: String,
	/// Domain the cookie is scoped to (without a leading dot).
	pub domain: String,
	/// Path prefix the cookie applies to.
	pub path: String,
	/// Expiration instant; `None` marks a session cookie.
	pub expires_at: Option<OffsetDateTime>,
	/// Whether the cookie may only travel over HTTPS.
	pub secure: bool,
}
impl HttpCookie {
	/// Creates a session cookie scoped to `domain` and the root path.
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl AsRef<str>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: normalize_domain(domain.as_ref()),
			path: "/".into(),
			expires_at: None,
			secure: false,
		}
	}

	/// Overrides the cookie path.
	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = path.into();

		self
	}

	/// Sets the expiration instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Marks the cookie as HTTPS-only.
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = secure;

		self
	}

	/// Returns `true` when the cookie domain covers `host`.
	pub fn matches_host(&self, host: &str) -> bool {
		let host = host.to_ascii_lowercase();

		host == self.domain
			|| host.strip_suffix(&self.domain).is_some_and(|prefix| prefix.ends_with('.'))
	}

	/// Returns `true` once the expiration instant has been reached.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| now >= expires_at)
	}

	/// Returns `true` when the cookie should be sent with a request to `url`.
	pub fn applies_to(&self, url: &Url, now: OffsetDateTime) -> bool {
		let Some(host) = url.host_str() else { return false };

		if self.is_expired_at(now) || !self.matches_host(host) {
			return false;
		}
		if self.secure && url.scheme() != "https" {
			return false;
		}

		path_matches(&self.path, url.path())
	}

	fn same_slot(&self, other: &Self) -> bool {
		self.name == other.name && self.domain == other.domain && self.path == other.path
	}
}

/// Ordered cookie collection with replace-on-merge semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
	cookies: Vec<HttpCookie>,
}
impl CookieJar {
	/// Builds a jar from an existing cookie list.
	pub fn from_cookies(cookies: impl IntoIterator<Item = HttpCookie>) -> Self {
		let mut jar = Self::default();

		jar.merge(cookies);

		jar
	}

	/// Returns `true` when the jar holds no cookies.
	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty()
	}

	/// Number of cookies held.
	pub fn len(&self) -> usize {
		self.cookies.len()
	}

	/// Borrows the stored cookies in insertion order.
	pub fn cookies(&self) -> &[HttpCookie] {
		&self.cookies
	}

	/// Consumes the jar and returns its cookies.
	pub fn into_cookies(self) -> Vec<HttpCookie> {
		self.cookies
	}

	/// Merges cookies, replacing any with the same name, domain, and path.
	///
	/// Cookies that arrive already expired delete their slot, mirroring how servers clear
	/// session state.
	pub fn merge(&mut self, incoming: impl IntoIterator<Item = HttpCookie>) {
		let now = OffsetDateTime::now_utc();

		for cookie in incoming {
			self.cookies.retain(|existing| !existing.same_slot(&cookie));

			if !cookie.is_expired_at(now) {
				self.cookies.push(cookie);
			}
		}
	}

	/// Renders the `Cookie` header value for `url`, if any cookie applies.
	pub fn header_for(&self, url: &Url, now: OffsetDateTime) -> Option<String> {
		let pairs = self
			.cookies
			.iter()
			.filter(|cookie| cookie.applies_to(url, now))
			.map(|cookie| format!("{}={}", cookie.name, cookie.value))
			.collect::<Vec<_>>();

		if pairs.is_empty() { None } else { Some(pairs.join("; ")) }
	}
}

/// Persistent cookie store shared by silent renewal sessions.
pub trait CookiesManager
where
	Self: Send + Sync,
{
	/// Returns `true` when no cookies are stored.
	fn is_empty(&self) -> bool;

	/// Snapshot of the stored cookies.
	fn cookies(&self) -> Vec<HttpCookie>;

	/// Merges cookies returned by a completed exchange into the store.
	fn save_cookies(&self, cookies: Vec<HttpCookie>);

	/// Offers cookies captured on intermediate redirect hops.
	///
	/// Implementations decide whether these are retained.
	fn save_intermediate_cookies(&self, cookies: Vec<HttpCookie>);

	/// Deletes every stored cookie.
	fn clear_cookies(&self);

	/// Combines the stored cookies with `extra` into a `Cookie` header for `url`.
	///
	/// `extra` takes precedence over stored cookies occupying the same slot.
	fn append_cookies(&self, url: &Url, extra: &[HttpCookie]) -> Option<String> {
		let mut jar = CookieJar::from_cookies(self.cookies());

		jar.merge(extra.iter().cloned());

		jar.header_for(url, OffsetDateTime::now_utc())
	}
}

pub(crate) fn normalize_domain(domain: &str) -> String {
	domain.trim_start_matches('.').to_ascii_lowercase()
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
	if cookie_path.is_empty() || cookie_path == "/" || cookie_path == request_path {
		return true;
	}

	request_path.strip_prefix(cookie_path).is_some_and(|rest| {
		cookie_path.ends_with('/') || rest.starts_with('/')
	})
}
