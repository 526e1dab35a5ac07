use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{split_title, Notifier, ALERT_TITLE};
use crate::error::NotifierError;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{name} missing"))
}

impl EmailNotifier {
    /// `Ok(None)` when `SMTP_HOST` is unset; an error when it is set but the
    /// rest of the SMTP settings are missing or invalid.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };
        if host.trim().is_empty() {
            return Ok(None);
        }
        let user = required("SMTP_USER")?;
        let pass = required("SMTP_PASS")?;
        let from_addr = required("NOTIFY_EMAIL_FROM")?;
        let to_addr = required("NOTIFY_EMAIL_TO")?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host.trim())
            .context("invalid SMTP_HOST")?
            .credentials(Credentials::new(user, pass))
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Some(Self { mailer, from, to }))
    }
}

/// Title line as the subject, the rest as a plain-text body.
fn subject_and_body(message: &str) -> (String, String) {
    let (title, body) = split_title(message);
    let subject = if title.trim().is_empty() { ALERT_TITLE } else { title.trim() };
    (subject.to_string(), body.to_string())
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifierError> {
        let (subject, body) = subject_and_body(message);
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifierError::Transport(format!("email: {e}")))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| NotifierError::Transport(format!("email: {e}")))?;
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "email"
    }
}
