//! # Reply Dispatcher
//!
//! Answers each inbound direct message with a fixed text through the Send API
//! and records the outcome in the auto-reply log.

use chrono::Utc;
use metrics::counter;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::graph::GraphClient;
use crate::models::{AutoReplyRecord, ReplyStatus};
use crate::store::ActivityLog;

const SEND_API_PATH: &str = "/me/messages";

/// Text sent in reply to every inbound message
pub const AUTO_REPLY_TEXT: &str = "Hi! This is Grace, your AI sales assistant. Thanks for your message! This is an automated demo response during our Instagram app review. Full conversational AI capabilities will be available soon! 🤖✨";

/// Sender and text of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender_id: String,
    pub text: String,
}

impl IncomingMessage {
    /// Extract from a `messaging[]` event.
    ///
    /// `None` when the sender id or the text is missing, or when the event is
    /// an echo of a message the page itself sent.
    pub fn from_event(event: &Value) -> Option<Self> {
        let message = event.get("message")?;
        if message.get("is_echo").and_then(Value::as_bool) == Some(true) {
            return None;
        }

        let sender_id = event
            .get("sender")
            .and_then(|sender| sender.get("id"))
            .and_then(value_as_id)?;
        let text = message
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())?;

        Some(Self {
            sender_id,
            text: text.to_string(),
        })
    }
}

// Sender ids arrive as strings, occasionally as numbers.
fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Sends the fixed reply and appends one record per handled message.
#[derive(Debug, Clone)]
pub struct ReplyDispatcher {
    graph: GraphClient,
    page_token: Option<String>,
    log: ActivityLog,
}

impl ReplyDispatcher {
    pub fn new(graph: GraphClient, page_token: Option<String>, log: ActivityLog) -> Self {
        Self {
            graph,
            page_token,
            log,
        }
    }

    /// Handle one `messaging[]` event. Returns the record written, or `None` when skipped.
    pub async fn dispatch(&self, event: &Value) -> Option<AutoReplyRecord> {
        let message = IncomingMessage::from_event(event)?;
        let status = self.send(&message.sender_id).await;

        let record = AutoReplyRecord {
            timestamp: Utc::now(),
            sender_id: message.sender_id,
            incoming_text: message.text,
            reply_text: AUTO_REPLY_TEXT.to_string(),
            status,
        };

        counter!("auto_replies_total", "status" => status.as_str()).increment(1);
        if let Err(e) = self.log.append_auto_reply(&record).await {
            warn!(error = %e, "Failed to append auto-reply record");
        }
        Some(record)
    }

    async fn send(&self, recipient_id: &str) -> ReplyStatus {
        let Some(page_token) = self.page_token.as_deref() else {
            info!("No page access token configured; auto-reply logged only");
            return ReplyStatus::LoggedOnly;
        };

        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": AUTO_REPLY_TEXT },
        });

        match self
            .graph
            .post_json(SEND_API_PATH, &[("access_token", page_token)], &body)
            .await
        {
            Ok(response) if response.is_ok() => ReplyStatus::SentViaApi,
            Ok(response) => {
                warn!(
                    status = response.status,
                    body = %response.body.to_value(),
                    "Send API rejected auto-reply"
                );
                ReplyStatus::LoggedOnly
            }
            Err(e) => {
                warn!(error = %e, "Send API request failed");
                ReplyStatus::LoggedOnly
            }
        }
    }
}
