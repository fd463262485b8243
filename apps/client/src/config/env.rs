use std::env;
use std::time::Duration;

use crate::error::ClientError;

/// Variable value, or `default` when unset.
pub fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Non-empty URL-like setting, or `default` when unset.
pub fn url_var(key: &str, default: &str) -> Result<String, ClientError> {
    let value = var_or(key, default);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::config(format!("{key} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Positive millisecond duration, or `default_ms` when unset.
pub fn millis_var(key: &str, default_ms: u64) -> Result<Duration, ClientError> {
    let ms = positive_var(key, default_ms)?;
    Ok(Duration::from_millis(ms))
}

/// Positive integer, or `default` when unset.
pub fn positive_var(key: &str, default: u64) -> Result<u64, ClientError> {
    match env::var(key) {
        Ok(raw) => {
            let parsed: u64 = raw.trim().parse().map_err(|_| {
                ClientError::config(format!("{key} must be a positive integer, got '{raw}'"))
            })?;
            if parsed == 0 {
                return Err(ClientError::config(format!("{key} must be greater than 0")));
            }
            Ok(parsed)
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}
