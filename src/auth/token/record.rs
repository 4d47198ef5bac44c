//! Granted OAuth token sets and their builder.

// self
use crate::{
	_prelude::*,
	auth::token::{jwt::JwtToken, secret::TokenSecret},
};

/// Errors produced by [`AuthTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AuthTokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Token set returned by a successful exchange.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// ID token, when the `openid` scope was granted.
	pub id_token: Option<JwtToken>,
	/// Lifetime reported by the token endpoint.
	pub expires_in: Option<Duration>,
	/// Refresh token secret, if the server issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the token was granted.
	pub granted_at: OffsetDateTime,
}
impl AuthToken {
	/// Returns a builder for constructing tokens.
	pub fn builder() -> AuthTokenBuilder {
		AuthTokenBuilder::default()
	}

	/// Instant the token stops being valid, if a lifetime is known.
	///
	/// A lifetime that overflows the calendar is treated as unknown.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_in.and_then(|lifetime| self.granted_at.checked_add(lifetime))
	}

	/// Returns `true` when no lifetime is known or `instant` is past the lifetime.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		match self.expires_at() {
			Some(expires_at) => instant > expires_at,
			None => true,
		}
	}

	/// Convenience helper that checks expiry using the current UTC instant.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Drops the lifetime so the next read treats the token as expired.
	///
	/// The refresh token is kept, so the next retrieval refreshes instead of renewing.
	pub fn expire(&mut self) {
		self.expires_in = None;
	}

	/// Returns the token with its refresh secret removed.
	pub fn without_refresh_token(mut self) -> Self {
		self.refresh_token = None;

		self
	}
}
impl Debug for AuthToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthToken")
			.field("access_token", &"<redacted>")
			.field("id_token", &self.id_token)
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("granted_at", &self.granted_at)
			.finish()
	}
}

/// Builder for [`AuthToken`].
#[derive(Clone, Debug, Default)]
pub struct AuthTokenBuilder {
	access_token: Option<TokenSecret>,
	id_token: Option<JwtToken>,
	expires_in: Option<Duration>,
	refresh_token: Option<TokenSecret>,
	granted_at: Option<OffsetDateTime>,
}
impl AuthTokenBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the raw ID token.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(JwtToken::new(token));

		self
	}

	/// Sets the lifetime reported by the server.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Reuses an existing refresh secret.
	pub fn refresh_secret(mut self, secret: Option<TokenSecret>) -> Self {
		self.refresh_token = secret;

		self
	}

	/// Sets the grant instant (defaults to now).
	pub fn granted_at(mut self, instant: OffsetDateTime) -> Self {
		self.granted_at = Some(instant);

		self
	}

	/// Consumes the builder and produces an [`AuthToken`].
	pub fn build(self) -> Result<AuthToken, AuthTokenBuilderError> {
		let access_token = self.access_token.ok_or(AuthTokenBuilderError::MissingAccessToken)?;

		Ok(AuthToken {
			access_token,
			id_token: self.id_token,
			expires_in: self.expires_in,
			refresh_token: self.refresh_token,
			granted_at: self.granted_at.unwrap_or_else(OffsetDateTime::now_utc),
		})
	}
}
