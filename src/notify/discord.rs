use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{post_json_with_retry, split_title, Notifier};
use crate::error::NotifierError;

/// Discord caps plain `content` at 2000 characters.
const CONTENT_LIMIT: usize = 2000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct WebhookPayload {
    content: String,
}

impl DiscordNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("DISCORD_WEBHOOK_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Discord markdown: bold title, markup characters backslash-escaped.
fn to_discord(message: &str) -> String {
    let (title, body) = split_title(message);
    let title = format!("**{}**", escape_discord(title));
    if body.is_empty() {
        return title;
    }
    format!("{title}\n{}", escape_discord(body))
}

fn escape_discord(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '~' | '`' | '|' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn clip(message: &str) -> String {
    if message.chars().count() <= CONTENT_LIMIT {
        return message.to_string();
    }
    let mut s: String = message.chars().take(CONTENT_LIMIT - 1).collect();
    s.push('…');
    s
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifierError> {
        let payload = WebhookPayload {
            content: clip(&to_discord(message)),
        };
        post_json_with_retry(
            &self.client,
            &self.webhook,
            &payload,
            self.timeout,
            self.max_retries,
            "discord",
        )
        .await
    }

    fn channel(&self) -> &'static str {
        "discord"
    }
}
