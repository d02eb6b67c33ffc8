/// WebSocket frame types for the live post channel
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PostNotification;

pub const INVALID_IDENTITY: &str = "INVALID_IDENTITY";
pub const UNKNOWN_IDENTITY: &str = "UNKNOWN_IDENTITY";
pub const UNAVAILABLE: &str = "UNAVAILABLE";
pub const BAD_FRAME: &str = "BAD_FRAME";

/// Frames sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to an identity. Kept as raw text so a malformed
    /// id can be answered with an error frame instead of a parse failure.
    Subscribe { user_id: String },

    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },

    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Frames sent by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { connection_id: Uuid },

    Subscribed { user_id: Uuid },

    /// Push payload `{postId, authorId, preview}`
    #[serde(rename_all = "camelCase")]
    NewPost {
        post_id: Uuid,
        author_id: Uuid,
        preview: String,
    },

    Pong { timestamp: i64 },

    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn new_post(notification: PostNotification) -> Self {
        ServerMessage::NewPost {
            post_id: notification.post_id,
            author_id: notification.author_id,
            preview: notification.preview,
        }
    }

    pub fn pong(timestamp: Option<i64>) -> Self {
        ServerMessage::Pong {
            timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
