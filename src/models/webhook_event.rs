//! Inbound webhook delivery record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

const WEBHOOK_RECEIVED: &str = "webhook_received";

/// One delivery from the platform, appended to the webhook log as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub timestamp: DateTime<Utc>,
    /// Always `webhook_received` for deliveries written by this service
    pub event: String,
    /// Raw payload
    #[schema(value_type = Object)]
    pub data: Value,
}

impl WebhookEvent {
    /// Record a delivery received now.
    pub fn received(data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event: WEBHOOK_RECEIVED.to_string(),
            data,
        }
    }
}
