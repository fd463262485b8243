//! Claims carried in the payload segment of a session token.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded token claims.
///
/// Kept as a raw JSON object: the client never validates the token, it only
/// reads identity hints out of it, so unknown claims are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Subject identifier (`sub`). Numeric subjects are rendered as strings.
    pub fn subject(&self) -> Option<String> {
        match self.0.get("sub")? {
            Value::String(sub) => Some(sub.clone()),
            Value::Number(sub) => Some(sub.to_string()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
