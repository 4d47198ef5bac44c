//! Headless renewal that replays the authorization request with stored session cookies.
//!
//! The authorization server recognizes the returning user through its cookies and redirects
//! straight to the redirect URI with a fresh code. The session walks the redirect chain one
//! hop at a time and stops as soon as the callback validates.

// self
use crate::{
	_prelude::*,
	auth::AuthCode,
	cookies::{CookiesManager, HttpCookie},
	error::{ConfigError, ValidationError},
	flows::AuthorizationAttempt,
	http::RedirectHttpClient,
	obs::{self, FlowKind},
};

/// Single-use redirect interception session.
pub struct SilentRenewalSession {
	client: Arc<dyn RedirectHttpClient>,
	cookies: Arc<dyn CookiesManager>,
	max_redirects: usize,
}
impl SilentRenewalSession {
	/// Creates a session over the given transport and cookie store.
	pub fn new(
		client: Arc<dyn RedirectHttpClient>,
		cookies: Arc<dyn CookiesManager>,
		max_redirects: usize,
	) -> Self {
		Self { client, cookies, max_redirects }
	}

	/// Runs the redirect chase for `attempt`.
	///
	/// Returns `Ok(None)` without any request when no cookies are stored. Validation failures
	/// on the callback surface as [`Error::Validation`]; a chain that ends (or exceeds the
	/// redirect bound) without reaching the callback is [`Error::DataMissing`].
	pub async fn execute(self, attempt: &AuthorizationAttempt) -> Result<Option<AuthCode>> {
		if self.cookies.is_empty() {
			obs::silent_renewal_unavailable(&"no stored cookies");

			return Ok(None);
		}

		obs::observe(FlowKind::SilentRenewal, "execute", self.chase(attempt)).await.map(Some)
	}

	async fn chase(&self, attempt: &AuthorizationAttempt) -> Result<AuthCode> {
		let mut intermediate = Vec::<HttpCookie>::new();
		let mut url = attempt.authorize_url.clone();

		for _ in 0..=self.max_redirects {
			let header = self.cookies.append_cookies(&url, &intermediate);
			let hop = self.client.fetch(&url, header.as_deref()).await?;
			let Some(location) = hop.redirect_location() else {
				return match attempt.validate(&hop.url) {
					Some(outcome) => self.finish(outcome, intermediate),
					None => Err(Error::DataMissing {
						reason: format!("chain ended at {} with HTTP {}", hop.url, hop.status),
					}),
				};
			};
			let target = hop.url.join(location).map_err(|source| {
				ConfigError::InvalidRedirectTarget { location: location.to_owned(), source }
			})?;

			if let Some(outcome) = attempt.validate(&target) {
				return self.finish(outcome, intermediate);
			}

			let host = hop.url.host_str().unwrap_or_default();

			// A hop may only set cookies for its own host.
			intermediate.extend(
				hop.cookies.iter().filter(|cookie| cookie.matches_host(host)).cloned(),
			);

			url = target;
		}

		Err(Error::DataMissing {
			reason: format!("no callback within {} redirects", self.max_redirects),
		})
	}

	fn finish(
		&self,
		outcome: Result<AuthCode, ValidationError>,
		intermediate: Vec<HttpCookie>,
	) -> Result<AuthCode> {
		let code = outcome?;

		if !intermediate.is_empty() {
			self.cookies.save_intermediate_cookies(intermediate);
		}

		Ok(code)
	}
}
impl Debug for SilentRenewalSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentRenewalSession").field("max_redirects", &self.max_redirects).finish()
	}
}
