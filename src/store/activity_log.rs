//! Append-only JSON-lines logs of webhook deliveries and auto-reply outcomes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::StoreError;
use crate::models::{AutoReplyRecord, WebhookEvent};

const WEBHOOK_LOG: &str = "webhook.log";
const AUTO_REPLY_LOG: &str = "auto_replies.log";

/// Default number of entries returned by the log readers
pub const DEFAULT_LOG_LIMIT: usize = 50;
/// Upper bound accepted for a caller-supplied limit
pub const MAX_LOG_LIMIT: usize = 500;

/// Webhook and auto-reply logs under a data directory.
///
/// Cloning shares the write lock, so appends from concurrent requests never
/// interleave within a line.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    webhook_path: PathBuf,
    auto_reply_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ActivityLog {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            webhook_path: dir.join(WEBHOOK_LOG),
            auto_reply_path: dir.join(AUTO_REPLY_LOG),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn webhook_path(&self) -> &Path {
        &self.webhook_path
    }

    pub fn auto_reply_path(&self) -> &Path {
        &self.auto_reply_path
    }

    pub async fn append_webhook_event(&self, event: &WebhookEvent) -> Result<(), StoreError> {
        self.append(&self.webhook_path, event).await
    }

    pub async fn append_auto_reply(&self, record: &AutoReplyRecord) -> Result<(), StoreError> {
        self.append(&self.auto_reply_path, record).await
    }

    /// Most recent `limit` webhook events, oldest first
    pub async fn read_webhook_events(&self, limit: usize) -> Result<Vec<WebhookEvent>, StoreError> {
        read_tail(&self.webhook_path, limit).await
    }

    /// Most recent `limit` auto-reply records, oldest first
    pub async fn read_auto_replies(
        &self,
        limit: usize,
    ) -> Result<Vec<AutoReplyRecord>, StoreError> {
        read_tail(&self.auto_reply_path, limit).await
    }

    async fn append<T: Serialize>(&self, path: &Path, entry: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.flush().await.map_err(|e| StoreError::io(path, e))
    }
}

async fn read_tail<T: DeserializeOwned>(path: &Path, limit: usize) -> Result<Vec<T>, StoreError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut entries: Vec<T> = Vec::new();
    // Decoded line by line so one corrupt line (bad JSON or bad UTF-8) only
    // drops itself.
    for (index, line) in contents.split(|byte| *byte == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, error = %e, "Skipping malformed log line");
            }
        }
    }

    let skip = entries.len().saturating_sub(limit);
    Ok(entries.split_off(skip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReplyStatus;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(sender: &str) -> AutoReplyRecord {
        AutoReplyRecord {
            timestamp: Utc::now(),
            sender_id: sender.to_string(),
            incoming_text: "hello".to_string(),
            reply_text: "hi".to_string(),
            status: ReplyStatus::LoggedOnly,
        }
    }

    #[tokio::test]
    async fn missing_logs_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path());

        assert!(log.read_webhook_events(50).await.unwrap().is_empty());
        assert!(log.read_auto_replies(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_one_json_object_per_line() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("data"));

        log.append_webhook_event(&WebhookEvent::received(json!({"object": "instagram"})))
            .await
            .unwrap();
        log.append_webhook_event(&WebhookEvent::received(json!({"object": "page"})))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(log.webhook_path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "webhook_received");
        assert_eq!(first["data"]["object"], "instagram");
    }

    #[tokio::test]
    async fn read_returns_most_recent_entries() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path());

        for i in 0..5 {
            log.append_auto_reply(&record(&format!("u{i}"))).await.unwrap();
        }

        let tail = log.read_auto_replies(2).await.unwrap();
        let senders: Vec<&str> = tail.iter().map(|r| r.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["u3", "u4"]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path());
        log.append_auto_reply(&record("u1")).await.unwrap();

        let mut raw = std::fs::read_to_string(log.auto_reply_path()).unwrap();
        raw.push_str("{not json\n\n");
        std::fs::write(log.auto_reply_path(), raw).unwrap();
        log.append_auto_reply(&record("u2")).await.unwrap();

        let entries = log.read_auto_replies(DEFAULT_LOG_LIMIT).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].sender_id, "u2");
    }

    #[tokio::test]
    async fn invalid_utf8_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path());
        log.append_auto_reply(&record("u1")).await.unwrap();

        let mut raw = std::fs::read(log.auto_reply_path()).unwrap();
        raw.extend_from_slice(b"\xff\xfe garbage\n");
        std::fs::write(log.auto_reply_path(), raw).unwrap();
        log.append_auto_reply(&record("u2")).await.unwrap();

        let entries = log.read_auto_replies(DEFAULT_LOG_LIMIT).await.unwrap();
        let senders: Vec<&str> = entries.iter().map(|r| r.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["u1", "u2"]);
    }
}
