//! REST collaborator for account endpoints.
//!
//! Only the calls that produce or consume the session token live here. Board,
//! comment and user endpoints go through [`AuthApi::get_json`] with a bearer
//! token and are otherwise opaque to this crate.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::state::credential_store::User;

/// Body returned by both login and registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// Account creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /auth/login` with the credentials in a Basic header.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .header(AUTHORIZATION, basic_header(username, password))
            .send()
            .await?;
        Self::read_auth_response(response).await
    }

    /// `POST /auth/register` with a JSON body.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        Self::read_auth_response(response).await
    }

    /// Authenticated GET of an arbitrary endpoint.
    ///
    /// A 401 maps to [`ClientError::Unauthorized`] so the caller can invalidate
    /// the session.
    pub async fn get_json(&self, path: &str, token: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .header(AUTHORIZATION, bearer_header(token))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_auth_response(response: reqwest::Response) -> Result<AuthResponse, ClientError> {
        let response = Self::check_status(response).await?;
        let body: AuthResponse = response.json().await?;
        if body.token.is_empty() {
            return Err(ClientError::http(None, "auth response carried an empty token"));
        }
        debug!(has_user = body.user.is_some(), "[AUTH API] received token");
        Ok(body)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        let detail = server_message(response).await;
        warn!(status = status.as_u16(), detail = %detail, "[AUTH API] request failed");
        Err(ClientError::http(Some(status.as_u16()), detail))
    }
}

/// `Authorization` value for username/password login.
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// `Authorization` value for token-authenticated endpoints.
pub fn bearer_header(token: &str) -> String {
    format!("Bearer {token}")
}

/// Best-effort extraction of `{ "message": ... }` from an error body.
async fn server_message(response: reqwest::Response) -> String {
    let fallback = response
        .status()
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    match response.json::<Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback),
        Err(_) => fallback,
    }
}
