use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Malformed token: {detail}")]
    MalformedToken { detail: String },
    #[error("Storage unavailable: {detail}")]
    StorageUnavailable { detail: String },
    #[error("Channel authentication rejected: {detail}")]
    ChannelAuthRejected { detail: String },
    #[error("Channel unreachable: {detail}")]
    ChannelUnreachable { detail: String },
    #[error("Channel timed out after {timeout_ms}ms: {detail}")]
    ChannelTimeout { timeout_ms: u64, detail: String },
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Channel not connected")]
    NotConnected,
    #[error("Subscription to '{topic}' rejected: {detail}")]
    SubscriptionRejected { topic: String, detail: String },
    #[error("Protocol error: {detail}")]
    Protocol { detail: String },
    #[error("Validation error: {detail}")]
    Validation { detail: String },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("HTTP error: {detail}")]
    Http { status: Option<u16>, detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
}

impl ClientError {
    /// Stable machine-readable code for logs and UI mapping.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::MalformedToken { .. } => "MALFORMED_TOKEN",
            ClientError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            ClientError::ChannelAuthRejected { .. } => "CHANNEL_AUTH_REJECTED",
            ClientError::ChannelUnreachable { .. } => "CHANNEL_UNREACHABLE",
            ClientError::ChannelTimeout { .. } => "CHANNEL_TIMEOUT",
            ClientError::ChannelClosed => "CHANNEL_CLOSED",
            ClientError::NotConnected => "NOT_CONNECTED",
            ClientError::SubscriptionRejected { .. } => "SUBSCRIPTION_REJECTED",
            ClientError::Protocol { .. } => "PROTOCOL_ERROR",
            ClientError::Validation { .. } => "VALIDATION_ERROR",
            ClientError::Unauthorized => "UNAUTHORIZED",
            ClientError::Http { .. } => "HTTP_ERROR",
            ClientError::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Whether a failed channel open is worth retrying.
    ///
    /// Only transport-level failures qualify. A rejected handshake, an explicit
    /// close or a protocol mismatch will fail the same way on the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::ChannelUnreachable { .. } | ClientError::ChannelTimeout { .. }
        )
    }

    pub fn malformed_token(detail: impl Into<String>) -> Self {
        Self::MalformedToken {
            detail: detail.into(),
        }
    }

    pub fn storage_unavailable(detail: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            detail: detail.into(),
        }
    }

    pub fn channel_auth_rejected(detail: impl Into<String>) -> Self {
        Self::ChannelAuthRejected {
            detail: detail.into(),
        }
    }

    pub fn channel_unreachable(detail: impl Into<String>) -> Self {
        Self::ChannelUnreachable {
            detail: detail.into(),
        }
    }

    pub fn channel_timeout(timeout_ms: u64, detail: impl Into<String>) -> Self {
        Self::ChannelTimeout {
            timeout_ms,
            detail: detail.into(),
        }
    }

    pub fn subscription_rejected(topic: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            topic: topic.into(),
            detail: detail.into(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
        }
    }

    pub fn http(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }
}

impl From<std::env::VarError> for ClientError {
    fn from(e: std::env::VarError) -> Self {
        ClientError::config(format!("env var error: {e}"))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        if status == Some(401) {
            return ClientError::Unauthorized;
        }
        ClientError::http(status, e.to_string())
    }
}
