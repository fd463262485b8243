//! Signed tokens shaped like the ones the API issues.
//!
//! The client never verifies signatures, but minting real HS256 tokens keeps
//! the tests honest about the wire format (unpadded base64url segments).

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;

pub const TEST_SECRET: &[u8] = b"client_test_secret";

#[derive(Debug, Serialize)]
struct TestClaims {
    sub: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    iat: i64,
    exp: i64,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn mint(sub: Value, username: Option<&str>, iat: i64, ttl_secs: i64) -> String {
    let claims = TestClaims {
        sub,
        username: username.map(str::to_string),
        iat,
        exp: iat + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .expect("should mint token successfully")
}

/// Token whose `sub` claim is the string `sub`, valid for 15 minutes.
pub fn mint_test_token(sub: &str) -> String {
    mint(Value::from(sub), None, now_secs(), 15 * 60)
}

/// Token with a numeric `sub`, as issued for integer user ids.
pub fn mint_numeric_token(sub: i64, username: &str) -> String {
    mint(Value::from(sub), Some(username), now_secs(), 15 * 60)
}

/// Token that expired an hour ago.
pub fn mint_expired_token(sub: &str) -> String {
    mint(Value::from(sub), None, now_secs() - 7200, 3600)
}
