//! Structural decoding of compact session tokens.
//!
//! A token is three `.`-separated base64url segments; the middle one is a
//! JSON object of claims. Nothing here checks the signature: the server that
//! issued the token is the only party that can vouch for it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;

use crate::auth::claims::Claims;
use crate::error::ClientError;

const SEGMENT_COUNT: usize = 3;

/// Decode the claims of `token`.
///
/// An absent or empty token is an anonymous session and yields `Ok(None)`.
/// Anything else that is not a well-formed three-segment token fails with
/// [`ClientError::MalformedToken`].
pub fn decode(token: Option<&str>) -> Result<Option<Claims>, ClientError> {
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => return Ok(None),
    };

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != SEGMENT_COUNT {
        return Err(ClientError::malformed_token(format!(
            "expected {SEGMENT_COUNT} segments, got {}",
            segments.len()
        )));
    }

    // Issuers disagree on padding; accept both forms.
    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ClientError::malformed_token(format!("payload is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(Some(Claims::new(claims))),
        Ok(_) => Err(ClientError::malformed_token("payload is not a JSON object")),
        Err(e) => Err(ClientError::malformed_token(format!(
            "payload is not JSON: {e}"
        ))),
    }
}

/// Subject id of `token`, or `None` when absent or undecodable.
pub fn subject_id(token: Option<&str>) -> Option<String> {
    decode(token).ok().flatten().and_then(|claims| claims.subject())
}
