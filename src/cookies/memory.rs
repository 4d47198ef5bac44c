//! In-process [`CookiesManager`] implementation.

// self
use crate::{
	_prelude::*,
	cookies::{CookieJar, CookiesManager, HttpCookie},
};

/// Cookie manager that keeps cookies in memory.
///
/// Intermediate cookies are only retained when `persist_intermediate` is enabled.
#[derive(Clone, Debug, Default)]
pub struct MemoryCookies {
	jar: Arc<RwLock<CookieJar>>,
	persist_intermediate: bool,
}
impl MemoryCookies {
	/// Creates an empty manager that ignores intermediate cookies.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a manager seeded with `cookies`.
	pub fn with_cookies(cookies: impl IntoIterator<Item = HttpCookie>) -> Self {
		Self { jar: Arc::new(RwLock::new(CookieJar::from_cookies(cookies))), ..Self::default() }
	}

	/// Controls whether cookies from intermediate redirect hops are retained.
	pub fn persist_intermediate(mut self, enabled: bool) -> Self {
		self.persist_intermediate = enabled;

		self
	}
}
impl CookiesManager for MemoryCookies {
	fn is_empty(&self) -> bool {
		self.jar.read().is_empty()
	}

	fn cookies(&self) -> Vec<HttpCookie> {
		self.jar.read().cookies().to_vec()
	}

	fn save_cookies(&self, cookies: Vec<HttpCookie>) {
		self.jar.write().merge(cookies);
	}

	fn save_intermediate_cookies(&self, cookies: Vec<HttpCookie>) {
		if self.persist_intermediate {
			self.save_cookies(cookies);
		}
	}

	fn clear_cookies(&self) {
		*self.jar.write() = CookieJar::default();
	}
}
