//! # Data Models
//!
//! Records persisted by the service and basic response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod auto_reply;
pub mod webhook_event;

pub use auto_reply::{AutoReplyRecord, ReplyStatus};
pub use webhook_event::WebhookEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "grace-connect".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
