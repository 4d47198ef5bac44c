// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRequest, AuthToken, JwtToken},
	repository::TokenExchanger,
	single_flight::SingleFlightExecutor,
};

/// Repository for the user's ID token.
///
/// The identity slot always requests `offline_access openid` without audiences and is stored
/// under [`ClientConfig::identity_storage_key`](crate::config::ClientConfig). Validity follows
/// the ID token's own `exp` claim rather than the access token lifetime.
#[derive(Clone, Debug)]
pub struct IdentityTokenRepository {
	exchanger: TokenExchanger,
	flights: Arc<SingleFlightExecutor<String, AuthToken>>,
}
impl IdentityTokenRepository {
	/// Wraps `exchanger` with the identity caching rule.
	pub fn new(exchanger: TokenExchanger) -> Self {
		Self { exchanger, flights: Default::default() }
	}

	/// Underlying exchanger.
	pub fn exchanger(&self) -> &TokenExchanger {
		&self.exchanger
	}

	/// Returns a live ID token, refreshing or renewing the identity slot when needed.
	///
	/// Fails with [`Error::TokenUnavailable`] when the token endpoint granted no ID token.
	pub async fn id_token(&self) -> Result<JwtToken> {
		let stored = self.exchanger.load(self.storage_key()).await?;

		if let Some(id_token) = stored.as_ref().and_then(live_id_token) {
			return Ok(id_token);
		}

		self.obtain().await?.id_token.ok_or_else(|| Error::TokenUnavailable {
			reason: "the token endpoint did not return an ID token".into(),
		})
	}

	/// Returns the token set stored in the identity slot, obtaining one when its ID token is
	/// missing or expired.
	pub async fn auth_token(&self) -> Result<AuthToken> {
		match self.exchanger.load(self.storage_key()).await? {
			Some(token) if has_live_id_token(&token) => Ok(token),
			_ => self.obtain().await,
		}
	}

	/// Cancels every in-flight identity exchange.
	pub fn reset(&self) {
		self.flights.cancel_tasks();
	}

	fn storage_key(&self) -> &str {
		&self.exchanger.config().identity_storage_key
	}

	async fn obtain(&self) -> Result<AuthToken> {
		let key = self.storage_key().to_owned();
		let exchanger = self.exchanger.clone();

		self.flights
			.perform_task(key.clone(), move |cancel| async move {
				let request = AccessTokenRequest::identity();
				let stored = exchanger.load(&key).await?;

				if let Some(token) = stored.as_ref().filter(|token| has_live_id_token(token)) {
					return Ok(token.clone());
				}

				let token = match stored.and_then(|token| token.refresh_token) {
					Some(refresh_token) => exchanger.refresh(&key, &refresh_token).await?,
					None => exchanger.renew(&request, None).await?,
				};

				exchanger.commit(&key, &request, token, &cancel).await
			})
			.await
	}
}

fn live_id_token(token: &AuthToken) -> Option<JwtToken> {
	token.id_token.as_ref().filter(|id_token| !id_token.is_expired()).cloned()
}

fn has_live_id_token(token: &AuthToken) -> bool {
	token.id_token.as_ref().is_some_and(|id_token| !id_token.is_expired())
}
