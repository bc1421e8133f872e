//! Auto-reply outcome record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether the platform accepted the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Send API answered 200
    SentViaApi,
    /// Not delivered (no page token, transport failure, or non-200); recorded only
    LoggedOnly,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::SentViaApi => "sent_via_api",
            ReplyStatus::LoggedOnly => "logged_only",
        }
    }
}

/// One auto-reply attempt for an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AutoReplyRecord {
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    #[serde(rename = "incoming_message")]
    pub incoming_text: String,
    #[serde(rename = "auto_reply")]
    pub reply_text: String,
    pub status: ReplyStatus,
}
