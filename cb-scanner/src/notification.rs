//! Webhook notification for scan results.
//!
//! Posts `{username, avatar_url, content}` to a Discord-compatible webhook.
//! Messages longer than the 2000-character limit are split on line
//! boundaries and sent in order.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use cb_common::config::NotificationConfig;

/// Maximum message length accepted by the webhook, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Errors from a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("webhook URL not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Webhook request body.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    avatar_url: &'a str,
    content: &'a str,
}

/// Index of the byte after the first `max_chars` characters of `s`.
fn char_boundary(s: &str, max_chars: usize) -> usize {
    s.char_indices().nth(max_chars).map_or(s.len(), |(i, _)| i)
}

/// Split a message into chunks of at most `MAX_MESSAGE_LENGTH` characters,
/// preferring line boundaries.
pub fn split_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.lines() {
        let line_len = line.chars().count();
        let separator = usize::from(!current.is_empty());

        if current_len + separator + line_len <= MAX_MESSAGE_LENGTH {
            if separator == 1 {
                current.push('\n');
            }
            current.push_str(line);
            current_len += separator + line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        // A single line longer than the limit is hard-split.
        let mut remaining = line;
        while remaining.chars().count() > MAX_MESSAGE_LENGTH {
            let split = char_boundary(remaining, MAX_MESSAGE_LENGTH);
            chunks.push(remaining[..split].to_string());
            remaining = &remaining[split..];
        }
        current = remaining.to_string();
        current_len = current.chars().count();
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Webhook notifier.
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    username: String,
    avatar_url: String,
    dry_run: bool,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            webhook_url: config
                .webhook_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from),
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
            dry_run: config.dry_run,
            client,
        }
    }

    /// Check if a webhook is configured
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a message, split into as many posts as needed.
    ///
    /// Stops at the first failed post.
    pub async fn send_message(&self, content: &str) -> Result<usize, NotificationError> {
        let chunks = split_message(content);

        if self.dry_run {
            for (i, chunk) in chunks.iter().enumerate() {
                info!(part = i + 1, of = chunks.len(), "Dry run, not posting:\n{}", chunk);
            }
            return Ok(chunks.len());
        }

        let url = self
            .webhook_url
            .as_deref()
            .ok_or(NotificationError::NotConfigured)?;

        for (i, chunk) in chunks.iter().enumerate() {
            self.post(url, chunk).await?;
            debug!(part = i + 1, of = chunks.len(), "Webhook post delivered");
        }

        Ok(chunks.len())
    }

    async fn post(&self, url: &str, content: &str) -> Result<(), NotificationError> {
        let payload = WebhookPayload {
            username: &self.username,
            avatar_url: &self.avatar_url,
            content,
        };

        let response = self.client.post(url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Best-effort delivery. Returns whether the message went out.
    pub async fn notify(&self, content: &str) -> bool {
        if !self.is_enabled() && !self.dry_run {
            debug!("No webhook configured, skipping notification");
            return false;
        }

        match self.send_message(content).await {
            Ok(parts) => {
                info!(parts, "Notification sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to send notification");
                false
            }
        }
    }
}
