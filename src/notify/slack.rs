use reqwest::Client;
use std::time::Duration;

use super::{post_json_with_retry, split_title, Notifier};
use crate::error::NotifierError;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl SlackNotifier {
    /// `None` when `SLACK_WEBHOOK_URL` is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            webhook_url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, n: u8) -> Self {
        self.max_retries = n;
        self
    }
}

/// Slack mrkdwn: control characters `&`, `<`, `>` are entity-encoded, the
/// title is bold. Underscores and asterisks inside words render literally.
fn to_mrkdwn(message: &str) -> String {
    let escape = |s: &str| s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    let (title, body) = split_title(message);
    let title = format!("*{}*", escape(title));
    if body.is_empty() {
        return title;
    }
    format!("{title}\n{}", escape(body))
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifierError> {
        let body = serde_json::json!({ "text": to_mrkdwn(message) });
        post_json_with_retry(
            &self.client,
            &self.webhook_url,
            &body,
            self.timeout,
            self.max_retries,
            "slack",
        )
        .await
    }

    fn channel(&self) -> &'static str {
        "slack"
    }
}
