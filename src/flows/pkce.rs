//! Authorization Code + PKCE attempt construction.

pub mod attempt;

pub use attempt::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRequest, AuthCode, JwtToken},
	config::{ClientConfig, RequesterContext},
	error::ValidationError,
};

const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Builds authorization attempts for the configured client.
#[derive(Clone)]
pub struct PkceFlowBuilder {
	config: Arc<ClientConfig>,
	requester: Arc<dyn RequesterContext>,
}
impl PkceFlowBuilder {
	/// Creates a builder bound to `config` and the requester context.
	pub fn new(config: Arc<ClientConfig>, requester: Arc<dyn RequesterContext>) -> Self {
		Self { config, requester }
	}

	/// Generates fresh state, nonce, and PKCE material and assembles the authorization URL.
	///
	/// `id_token_hint` is forwarded as `id_token_hint`, and its subject becomes the
	/// `login_hint` ahead of the requester's fallback.
	pub fn build(
		&self,
		request: &AccessTokenRequest,
		id_token_hint: Option<&JwtToken>,
	) -> AuthorizationAttempt {
		let pkce_config = &self.config.pkce;
		let state = random_string(pkce_config.state_len);
		let nonce = random_string(pkce_config.nonce_len);
		let verifier = random_string(pkce_config.verifier_len);
		let pkce = PkcePair {
			challenge: compute_pkce_challenge(&verifier),
			verifier,
			method: PkceCodeChallengeMethod::S256,
		};
		let login_hint = id_token_hint
			.and_then(|token| token.subject_id().map(ToOwned::to_owned))
			.or_else(|| self.requester.login_hint());
		let mut authorize_url = self.config.authorization_endpoint.clone();
		let mut pairs = authorize_url.query_pairs_mut();

		pairs.append_pair("client_id", &self.config.client_id);
		pairs.append_pair("response_type", "code");
		pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());

		if let Some(audience) = request.audiences.to_param() {
			pairs.append_pair("audience", &audience);
		}
		if let Some(scope) = request.scopes.to_param() {
			pairs.append_pair("scope", &scope);
		}

		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
		pairs.append_pair("state", &state);
		pairs.append_pair("nonce", &nonce);
		pairs.append_pair("ui_locales", &self.requester.language_code());
		pairs.append_pair("hide_header", "true");

		if let Some(hint) = id_token_hint {
			pairs.append_pair("id_token_hint", hint.as_str());
		}
		if let Some(login_hint) = &login_hint {
			pairs.append_pair("login_hint", login_hint);
		}

		drop(pairs);

		AuthorizationAttempt {
			authorize_url,
			redirect_uri: self.config.redirect_uri.clone(),
			state,
			nonce,
			pkce,
		}
	}

	/// Validates a navigation target against `attempt`; see [`AuthorizationAttempt::validate`].
	pub fn validate(
		&self,
		attempt: &AuthorizationAttempt,
		url: &Url,
	) -> Option<Result<AuthCode, ValidationError>> {
		attempt.validate(url)
	}
}
impl Debug for PkceFlowBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceFlowBuilder").field("client_id", &self.config.client_id).finish()
	}
}

fn random_string(len: usize) -> String {
	let mut rng = rand::rng();

	(0..len).map(|_| char::from(UNRESERVED[rng.random_range(0..UNRESERVED.len())])).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
