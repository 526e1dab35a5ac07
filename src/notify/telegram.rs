use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{escape_markdown, post_json_with_retry, split_title, Notifier};
use crate::error::NotifierError;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` with legacy Markdown.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: API_BASE.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    /// `TELEGRAM_BOT_TOKEN` + `TELEGRAM_CHAT_ID`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.trim().is_empty())?;
        let chat = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.trim().is_empty())?;
        Some(Self::new(token.trim(), chat.trim()))
    }

    /// Point at a different Bot API host (self-hosted server, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

/// Legacy Markdown: bold title, every other line escaped so links and
/// timestamps with `_` or `*` cannot break entity parsing.
fn to_markdown(message: &str) -> String {
    let (title, body) = split_title(message);
    let title = format!("*{}*", escape_markdown(title));
    if body.is_empty() {
        return title;
    }
    format!("{title}\n{}", escape_markdown(body))
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifierError> {
        let text = to_markdown(message);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };
        post_json_with_retry(
            &self.client,
            &self.endpoint(),
            &payload,
            self.timeout,
            self.max_retries,
            "telegram",
        )
        .await
    }

    fn channel(&self) -> &'static str {
        "telegram"
    }
}
