// src/notify/mod.rs
//! Outbound alert channels. The dispatcher only sees `Notifier::send(message)`;
//! each channel owns its own wire format, retries and credentials.

pub mod discord;
pub mod email;
pub mod slack;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::dispatch::AlertCandidate;
use crate::error::NotifierError;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;
pub use telegram::TelegramNotifier;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifierError>;
    fn channel(&self) -> &'static str;
}

/// Escape the characters legacy Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub const ALERT_TITLE: &str = "Forex headline alert";

/// Plain-text alert for one headline: title line, then details.
/// Channels add their own markup and escaping on top.
pub fn render_alert(c: &AlertCandidate) -> String {
    let mut lines = vec![
        ALERT_TITLE.to_string(),
        c.headline.clone(),
        format!(
            "Source: {}{}",
            c.source,
            if c.published_at.is_empty() {
                String::new()
            } else {
                format!(" ({})", c.published_at)
            }
        ),
    ];
    if let Some(s) = &c.sentiment {
        lines.push(format!(
            "Sentiment: {} ({:.0}%)",
            s.label.as_str(),
            s.score * 100.0
        ));
    }
    if let Some(sig) = c.signal {
        lines.push(format!("Instrument signal: {}", serde_label(&sig)));
    }
    lines.push(format!(
        "Bias: {} (bull {} / bear {})",
        serde_label(&c.verdict.direction),
        c.verdict.bullish_power,
        c.verdict.bearish_power
    ));
    if let Some(link) = &c.link {
        lines.push(link.clone());
    }
    lines.join("\n")
}

/// Split a rendered alert into its title line and the rest.
pub(crate) fn split_title(message: &str) -> (&str, &str) {
    match message.split_once('\n') {
        Some((title, body)) => (title, body),
        None => (message, ""),
    }
}

/// The serde name of a unit enum variant ("BUY", "bearish", ...).
fn serde_label<T: Serialize>(v: &T) -> String {
    serde_json::to_value(v)
        .ok()
        .and_then(|j| j.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// POST a JSON body, retrying transport errors, 429 and 5xx with exponential backoff.
pub(crate) async fn post_json_with_retry<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    max_retries: u8,
    channel: &'static str,
) -> Result<(), NotifierError> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let retry_left = attempt < max_retries.max(1);
        let res = client.post(url).timeout(timeout).json(payload).send().await;

        let err = match res {
            Ok(rsp) if rsp.status().is_success() => return Ok(()),
            Ok(rsp) => {
                let status = rsp.status();
                let retryable = status.is_server_error() || status.as_u16() == 429;
                let e = NotifierError::Rejected {
                    channel,
                    status: status.as_u16(),
                };
                if !retryable {
                    return Err(e);
                }
                e
            }
            Err(e) if e.is_timeout() => NotifierError::Timeout(timeout),
            Err(e) => NotifierError::Transport(format!("{channel}: {e}")),
        };

        if !retry_left {
            return Err(err);
        }
        tracing::debug!(target: "notify", channel, attempt, error = %err, "retrying");
        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
    }
}

/// Per-channel budget inside the mux; keep it below the dispatcher timeout.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(8);

/// Fans one message out to every configured channel at once.
///
/// Each channel runs under its own budget, so a slow one cannot hold up the
/// rest. Succeeds when at least one channel delivered. With no channel
/// configured it reports `NotConfigured`.
pub struct NotifierMux {
    channels: Vec<Arc<dyn Notifier>>,
    channel_timeout: Duration,
}

impl Default for NotifierMux {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            channel_timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, n: impl Notifier + 'static) -> Self {
        self.channels.push(Arc::new(n));
        self
    }

    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.channel()).collect()
    }

    /// Build from environment; channels whose variables are missing are skipped.
    pub fn from_env() -> Self {
        let mut mux = Self::new();
        if let Some(t) = TelegramNotifier::from_env() {
            mux = mux.with(t);
        }
        if let Some(d) = DiscordNotifier::from_env() {
            mux = mux.with(d);
        }
        if let Some(s) = SlackNotifier::from_env() {
            mux = mux.with(s);
        }
        match EmailNotifier::from_env() {
            Ok(Some(e)) => mux = mux.with(e),
            Ok(None) => {}
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(target: "notify", error = %reason, "email channel misconfigured; skipping");
            }
        }
        tracing::info!(target: "notify", channels = ?mux.channels(), "notifier channels ready");
        mux
    }
}

#[async_trait::async_trait]
impl Notifier for NotifierMux {
    async fn send(&self, message: &str) -> Result<(), NotifierError> {
        if self.channels.is_empty() {
            return Err(NotifierError::NotConfigured("no alert channel set".into()));
        }

        let mut set = JoinSet::new();
        for ch in &self.channels {
            let ch = Arc::clone(ch);
            let message = message.to_string();
            let budget = self.channel_timeout;
            set.spawn(async move {
                let res = match tokio::time::timeout(budget, ch.send(&message)).await {
                    Ok(r) => r,
                    Err(_) => Err(NotifierError::Timeout(budget)),
                };
                (ch.channel(), res)
            });
        }

        let mut delivered = 0usize;
        let mut last_err = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((channel, Err(e))) => {
                    tracing::warn!(target: "notify", channel, error = %e, "channel failed");
                    last_err = Some(e);
                }
                Err(e) => {
                    tracing::error!(target: "notify", error = %e, "channel task aborted");
                    last_err = Some(NotifierError::Transport(format!("channel task: {e}")));
                }
            }
        }
        match (delivered, last_err) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn channel(&self) -> &'static str {
        "mux"
    }
}
