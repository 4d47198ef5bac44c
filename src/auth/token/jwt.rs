//! Unverified ID token claim extraction.
//!
//! Only the payload segment is decoded, to read the subject id and the expiration used for
//! client-side bookkeeping. Signatures are never checked.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, obs};

/// ID token with unverified subject and expiration claims.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct JwtToken {
	raw: String,
	subject_id: Option<String>,
	expires_at: Option<OffsetDateTime>,
}
impl JwtToken {
	/// Wraps a raw JWT, decoding its claims.
	///
	/// Decode failures are logged and leave the affected claim absent.
	pub fn new(raw: impl Into<String>) -> Self {
		let raw = raw.into();
		let (subject_id, expires_at) = match decode_payload(&raw) {
			Ok(payload) => (subject_claim(&payload), expiration_claim(&payload)),
			Err(err) => {
				obs::claim_decode_failed("payload", &err);

				(None, None)
			},
		};

		Self { raw, subject_id, expires_at }
	}

	/// Raw compact-serialized token.
	pub fn as_str(&self) -> &str {
		&self.raw
	}

	/// Subject identifier (`userId`, falling back to `sub`).
	pub fn subject_id(&self) -> Option<&str> {
		self.subject_id.as_deref()
	}

	/// Expiration instant decoded from `exp`.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns `true` when `exp` has passed at `now` or could not be decoded.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => now >= expires_at,
			None => true,
		}
	}

	/// Checks expiry against the current UTC clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}
impl From<String> for JwtToken {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl From<JwtToken> for String {
	fn from(value: JwtToken) -> Self {
		value.raw
	}
}
impl Debug for JwtToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtToken")
			.field("subject_id", &self.subject_id)
			.field("expires_at", &self.expires_at)
			.finish_non_exhaustive()
	}
}

#[derive(Debug, ThisError)]
enum ClaimDecodeError {
	#[error("JWT has no payload segment.")]
	MissingPayload,
	#[error("JWT payload is not valid base64url.")]
	Base64(#[from] base64::DecodeError),
	#[error("JWT payload is not a JSON object.")]
	Json(#[from] serde_json::Error),
}

fn decode_payload(raw: &str) -> Result<Map<String, Value>, ClaimDecodeError> {
	let segment = raw.split('.').nth(1).ok_or(ClaimDecodeError::MissingPayload)?;
	let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))?;

	Ok(serde_json::from_slice(&bytes)?)
}

fn subject_claim(payload: &Map<String, Value>) -> Option<String> {
	payload
		.get("userId")
		.or_else(|| payload.get("sub"))
		.and_then(Value::as_str)
		.map(ToOwned::to_owned)
}

fn expiration_claim(payload: &Map<String, Value>) -> Option<OffsetDateTime> {
	let exp = payload.get("exp")?;
	let Some(seconds) = exp.as_i64().or_else(|| exp.as_f64().map(|value| value as i64)) else {
		obs::claim_decode_failed("exp", &"value is not numeric");

		return None;
	};

	OffsetDateTime::from_unix_timestamp(seconds)
		.inspect_err(|err| obs::claim_decode_failed("exp", err))
		.ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn encode(payload: &str) -> String {
		format!("eyJhbGciOiJub25lIn0.{}.signature", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn claims_round_trip_through_payload_segment() {
		let token = JwtToken::new(encode("{\"userId\":\"abc\",\"exp\":1234567890}"));

		assert_eq!(token.subject_id(), Some("abc"));
		assert_eq!(
			token.expires_at(),
			Some(
				OffsetDateTime::from_unix_timestamp(1_234_567_890)
					.expect("Fixture timestamp should be valid.")
			)
		);
		assert!(token.is_expired());
	}

	#[test]
	fn subject_falls_back_to_sub_claim() {
		let token = JwtToken::new(encode("{\"sub\":\"user-1\"}"));

		assert_eq!(token.subject_id(), Some("user-1"));
		assert_eq!(token.expires_at(), None);
		assert!(token.is_expired(), "Missing exp must be treated as expired.");
	}

	#[test]
	fn malformed_tokens_keep_claims_absent() {
		let array_payload = encode("[1,2,3]");

		for raw in ["opaque", "a.!!!.c", array_payload.as_str()] {
			let token = JwtToken::new(raw);

			assert_eq!(token.as_str(), raw);
			assert_eq!(token.subject_id(), None);
			assert!(token.is_expired());
		}
	}

	#[test]
	fn future_expiration_is_not_expired() {
		let exp = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();
		let token = JwtToken::new(encode(&format!("{{\"userId\":\"u\",\"exp\":{exp}}}")));

		assert!(!token.is_expired());
	}

	#[test]
	fn serializes_as_raw_string() {
		let raw = encode("{\"userId\":\"abc\"}");
		let token = JwtToken::new(raw.clone());
		let json = serde_json::to_string(&token).expect("JWT should serialize.");

		assert_eq!(json, format!("\"{raw}\""));

		let back: JwtToken = serde_json::from_str(&json).expect("JWT should deserialize.");

		assert_eq!(back.subject_id(), Some("abc"));
	}
}
