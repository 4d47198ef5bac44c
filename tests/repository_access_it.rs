#![cfg(feature = "reqwest")]

// crates.io
use futures::future;
use httpmock::prelude::*;
// self
use oauth2_lifecycle::{
	_preludet::*,
	auth::{AccessTokenRequest, AuthToken, TokenSecret},
	config::{ClientConfig, RetryConfig},
	cookies::MemoryCookies,
	error::GrantErrorCode,
	store::{AuthTokenStorage, MemoryStore},
};

const CLIENT_ID: &str = "client-access";

fn build_config(server: &MockServer, retry: RetryConfig) -> ClientConfig {
	ClientConfig::builder(CLIENT_ID)
		.authorization_endpoint(
			Url::parse(&server.url("/authorize"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.redirect_uri(Url::parse("myapp://callback").expect("Redirect URI should parse."))
		.retry(retry)
		.build()
		.expect("Client config should build successfully.")
}

fn request() -> AccessTokenRequest {
	AccessTokenRequest::from_values(["api.example.com"], ["profile.read"])
		.expect("Access token request should be valid.")
}

async fn seed_expired(store: &MemoryStore, request: &AccessTokenRequest, refresh: &str) {
	let token = AuthToken::builder()
		.access_token("access-stale")
		.refresh_token(refresh)
		.expires_in(Duration::minutes(5))
		.granted_at(OffsetDateTime::now_utc() - Duration::hours(1))
		.build()
		.expect("Token fixture should build successfully.");

	store
		.set(&request.storage_key(), Some(token))
		.await
		.expect("Failed to seed the expired token into the store.");
}

#[tokio::test]
async fn refresh_rotates_tokens_and_updates_store() {
	let server = MockServer::start_async().await;
	let (repository, store) = build_reqwest_test_repository(
		build_config(&server, RetryConfig::disabled()),
		Arc::new(MemoryCookies::new()),
	);
	let request = request();

	seed_expired(&store, &request, "refresh-old").await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-old")
				.form_urlencoded_tuple("client_id", CLIENT_ID);
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":1800}",
				);
		})
		.await;
	let header = repository
		.bearer_header(&request)
		.await
		.expect("Refresh token exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(header, "Bearer access-new");

	let stored = store
		.get(&request.storage_key())
		.await
		.expect("Token store read should succeed.")
		.expect("Refreshed token should be stored.");

	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-new"));
	assert_eq!(stored.expires_in, Some(Duration::seconds(1800)));
}

#[tokio::test]
async fn concurrent_requests_hit_token_endpoint_once() {
	let server = MockServer::start_async().await;
	let (repository, store) = build_reqwest_test_repository(
		build_config(&server, RetryConfig::disabled()),
		Arc::new(MemoryCookies::new()),
	);
	let request = request();

	seed_expired(&store, &request, "refresh-shared").await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(100))
				.body("{\"access_token\":\"access-shared\",\"token_type\":\"bearer\",\"expires_in\":600}");
		})
		.await;
	let results = future::join_all((0..8).map(|_| repository.access_token(&request))).await;

	mock.assert_calls_async(1).await;

	for result in results {
		let token = result.expect("Every waiter should observe the shared refresh.");

		assert_eq!(token.expose(), "access-shared");
	}

	let stored = store
		.get(&request.storage_key())
		.await
		.expect("Token store read should succeed.")
		.expect("Refreshed token should be stored.");

	assert_eq!(
		stored.refresh_token.as_ref().map(TokenSecret::expose),
		Some("refresh-shared"),
		"An unrotated refresh token must be kept."
	);
}

#[tokio::test]
async fn invalid_grant_clears_refresh_token() {
	let server = MockServer::start_async().await;
	let (repository, store) = build_reqwest_test_repository(
		build_config(&server, RetryConfig::default()),
		Arc::new(MemoryCookies::new()),
	);
	let request = request();

	seed_expired(&store, &request, "refresh-revoked").await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"revoked\"}");
		})
		.await;
	let err = repository.access_token(&request).await.expect_err("Revoked grant should fail.");

	mock.assert_calls_async(1).await;

	match err {
		Error::GrantRejected { code, reason } => {
			assert_eq!(code, GrantErrorCode::InvalidGrant);
			assert_eq!(reason, "revoked");
		},
		other => panic!("Unexpected error: {other:?}"),
	}

	let stored = store
		.get(&request.storage_key())
		.await
		.expect("Token store read should succeed.")
		.expect("Token entry should survive without its refresh token.");

	assert!(stored.refresh_token.is_none());
}

#[tokio::test]
async fn unavailable_endpoint_is_retried_until_budget_runs_out() {
	let server = MockServer::start_async().await;
	let retry = RetryConfig {
		start_interval_ms: 20,
		increase_interval_ms: 20,
		max_interval_ms: 40,
		max_combined_timeout_ms: 50,
	};
	let (repository, store) = build_reqwest_test_repository(
		build_config(&server, retry),
		Arc::new(MemoryCookies::new()),
	);
	let request = request();

	seed_expired(&store, &request, "refresh-kept").await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503)
				.header("content-type", "application/json")
				.body("{\"error\":\"temporarily_unavailable\"}");
		})
		.await;
	let metrics = repository.exchanger().metrics();
	let err = repository.access_token(&request).await.expect_err("Outage should surface.");

	assert_eq!(err.status(), Some(503));
	assert!(mock.calls_async().await > 1, "Transient failures should be retried.");
	assert_eq!(metrics.refresh_failures(), 1);

	let stored = store
		.get(&request.storage_key())
		.await
		.expect("Token store read should succeed.")
		.expect("Token entry should remain.");

	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-kept"));
}
