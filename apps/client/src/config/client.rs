//! Client configuration sourced from `MOODBOARD_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::{millis_var, positive_var, url_var, var_or};
use crate::error::ClientError;
use crate::realtime::{ChannelConfig, ReconnectPolicy};

pub const API_URL_VAR: &str = "MOODBOARD_API_URL";
pub const WS_URL_VAR: &str = "MOODBOARD_WS_URL";
pub const STORAGE_PATH_VAR: &str = "MOODBOARD_STORAGE_PATH";
pub const HANDSHAKE_TIMEOUT_VAR: &str = "MOODBOARD_HANDSHAKE_TIMEOUT_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "MOODBOARD_REQUEST_TIMEOUT_MS";
pub const MAX_ATTEMPTS_VAR: &str = "MOODBOARD_WS_MAX_ATTEMPTS";

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8887";
const DEFAULT_STORAGE_PATH: &str = ".moodboard/session.json";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_ATTEMPTS: u64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST API, without trailing slash.
    pub api_url: String,
    pub ws_url: String,
    /// JSON file backing the credential store.
    pub storage_path: PathBuf,
    pub handshake_timeout: Duration,
    /// Bound on subscribe acks and on REST calls.
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            handshake_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ClientError> {
        let max_attempts = positive_var(MAX_ATTEMPTS_VAR, DEFAULT_MAX_ATTEMPTS)?;
        let max_attempts = u32::try_from(max_attempts)
            .map_err(|_| ClientError::config(format!("{MAX_ATTEMPTS_VAR} is too large")))?;

        Ok(Self {
            api_url: url_var(API_URL_VAR, DEFAULT_API_URL)?
                .trim_end_matches('/')
                .to_string(),
            ws_url: url_var(WS_URL_VAR, DEFAULT_WS_URL)?,
            storage_path: PathBuf::from(var_or(STORAGE_PATH_VAR, DEFAULT_STORAGE_PATH)),
            handshake_timeout: millis_var(HANDSHAKE_TIMEOUT_VAR, DEFAULT_TIMEOUT_MS)?,
            request_timeout: millis_var(REQUEST_TIMEOUT_VAR, DEFAULT_TIMEOUT_MS)?,
            reconnect: ReconnectPolicy {
                max_attempts,
                ..ReconnectPolicy::default()
            },
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.ws_url.clone(),
            handshake_timeout: self.handshake_timeout,
            request_timeout: self.request_timeout,
        }
    }
}
