//! One in-flight authorization attempt and its callback validation.

// self
use crate::{_prelude::*, auth::AuthCode, error::ValidationError};

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// PKCE verifier and the challenge derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
	pub(crate) verifier: String,
	pub(crate) challenge: String,
	pub(crate) method: PkceCodeChallengeMethod,
}
impl PkcePair {
	/// Secret verifier sent with the code exchange.
	pub fn verifier(&self) -> &str {
		&self.verifier
	}

	/// Challenge sent on the authorization URL.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (currently always `S256`).
	pub fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// State needed to validate the callback of one authorization attempt.
///
/// Created right before an interactive or silent attempt starts and discarded once it
/// resolves.
#[derive(Clone, Debug)]
pub struct AuthorizationAttempt {
	/// Fully-formed authorization URL to load.
	pub authorize_url: Url,
	/// Redirect URI the callback must start with.
	pub redirect_uri: Url,
	/// Opaque value that must round-trip on the callback.
	pub state: String,
	/// OIDC nonce bound into the ID token.
	pub nonce: String,
	pub(crate) pkce: PkcePair,
}
impl AuthorizationAttempt {
	/// PKCE material for this attempt.
	pub fn pkce(&self) -> &PkcePair {
		&self.pkce
	}

	/// Returns `true` when `url` targets the redirect URI.
	pub fn is_redirect(&self, url: &Url) -> bool {
		url.as_str().starts_with(self.redirect_uri.as_str())
	}

	/// Validates a navigation target.
	///
	/// Returns `None` while `url` is not the redirect URI, meaning the flow is still in
	/// progress. Otherwise the first applicable rule decides: a non-empty `error`, then a
	/// differing `state`, then a present `code`; a callback with none of these is
	/// [`ValidationError::AuthorizationCodeMissing`].
	pub fn validate(&self, url: &Url) -> Option<Result<AuthCode, ValidationError>> {
		if !self.is_redirect(url) {
			return None;
		}
		if let Some(error) = query_param(url, "error").filter(|error| !error.is_empty()) {
			return Some(Err(match error.as_str() {
				"access_denied" => ValidationError::AccessDenied,
				"user_blocked" => ValidationError::UserBlocked,
				_ => ValidationError::AuthApi {
					code: error,
					description: query_param(url, "error_description"),
				},
			}));
		}
		if query_param(url, "state").is_some_and(|state| state != self.state) {
			return Some(Err(ValidationError::StateMismatch));
		}

		Some(match query_param(url, "code") {
			Some(code) => Ok(AuthCode {
				code,
				code_verifier: self.pkce.verifier.clone(),
				redirect_uri: self.redirect_uri.clone(),
			}),
			None => Err(ValidationError::AuthorizationCodeMissing),
		})
	}
}

fn query_param(url: &Url, name: &str) -> Option<String> {
	url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn attempt() -> AuthorizationAttempt {
		AuthorizationAttempt {
			authorize_url: Url::parse("https://auth.example.com/authorize?state=S1")
				.expect("Authorization URL fixture should parse."),
			redirect_uri: Url::parse("myapp://callback").expect("Redirect fixture should parse."),
			state: "S1".into(),
			nonce: "N1".into(),
			pkce: PkcePair {
				verifier: "verifier".into(),
				challenge: "challenge".into(),
				method: PkceCodeChallengeMethod::S256,
			},
		}
	}

	fn check(raw: &str) -> Option<Result<AuthCode, ValidationError>> {
		attempt().validate(&Url::parse(raw).expect("Callback fixture should parse."))
	}

	#[test]
	fn unrelated_urls_yield_no_result() {
		assert!(check("https://auth.example.com/login?code=ABC&state=S1").is_none());
	}

	#[test]
	fn state_mismatch_is_rejected() {
		assert_eq!(
			check("myapp://callback?state=S2&code=ABC"),
			Some(Err(ValidationError::StateMismatch))
		);
	}

	#[test]
	fn matching_state_yields_code() {
		let code = check("myapp://callback?state=S1&code=ABC")
			.expect("Callback should produce a result.")
			.expect("Callback should validate.");

		assert_eq!(code.code, "ABC");
		assert_eq!(code.code_verifier, "verifier");
		assert_eq!(code.redirect_uri.as_str(), "myapp://callback");
	}

	#[test]
	fn error_parameter_wins_over_everything() {
		assert_eq!(
			check("myapp://callback?state=S2&code=ABC&error=access_denied"),
			Some(Err(ValidationError::AccessDenied))
		);
		assert_eq!(
			check("myapp://callback?error=user_blocked"),
			Some(Err(ValidationError::UserBlocked))
		);
		assert_eq!(
			check("myapp://callback?error=server_error&error_description=down"),
			Some(Err(ValidationError::AuthApi {
				code: "server_error".into(),
				description: Some("down".into())
			}))
		);
	}

	#[test]
	fn empty_error_and_missing_code_fall_through() {
		assert_eq!(
			check("myapp://callback?error=&state=S1"),
			Some(Err(ValidationError::AuthorizationCodeMissing))
		);
	}
}
