//! Authorization codes ready for a PKCE token exchange.

// self
use crate::_prelude::*;

/// Authorization code plus the PKCE material needed to redeem it.
///
/// Produced once per successful authorization attempt and consumed by exactly one exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCode {
	/// Code returned on the redirect URI.
	pub code: String,
	/// PKCE verifier generated for the attempt.
	pub code_verifier: String,
	/// Redirect URI the code was issued for.
	pub redirect_uri: Url,
}
impl Debug for AuthCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthCode")
			.field("code", &self.code)
			.field("code_verifier", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}
