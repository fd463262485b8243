use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: i32 = 1;

/// Topic carrying user notifications (likes, comments).
pub const NOTIFICATIONS_TOPIC: &str = "notifications";
/// Command pushed when someone likes one of the user's boards.
pub const LIKE_COMMAND: &str = "like";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Authentication handshake; the token is the only credential.
    Hello { protocol: i32, token: String },
    Subscribe { id: u64, topic: String },
    Unsubscribe { topic: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    HelloAck {
        protocol: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    /// Positive reply to the request carrying `id`.
    Ack { id: u64 },

    Publish { topic: String, data: Value },

    Cmd {
        cmd: String,
        #[serde(default)]
        payload: Value,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        code: ErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadProtocol,
    BadTopic,
    BadRequest,
    Unauthorized,
    Forbidden,
    /// Any code this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadProtocol => "bad_protocol",
            ErrorCode::BadTopic => "bad_topic",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Unknown => "unknown",
        }
    }
}
