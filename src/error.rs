// src/error.rs
//! Failure taxonomy for the cycle pipeline.
//!
//! None of these escape a cycle: each is logged with enough context to name the
//! offending feed, item or channel, and the cycle carries on with what it has.

use std::time::Duration;

/// A feed produced nothing usable this cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceFetchError {
    #[error("feed `{feed}` timed out after {after:?}")]
    Timeout { feed: String, after: Duration },

    #[error("feed `{feed}` transport failure: {message}")]
    Transport { feed: String, message: String },

    #[error("feed `{feed}` returned a malformed payload: {message}")]
    Malformed { feed: String, message: String },
}

impl SourceFetchError {
    pub fn transport(feed: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            feed: feed.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn malformed(feed: &str, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            feed: feed.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Name of the feed that failed.
    pub fn feed(&self) -> &str {
        match self {
            Self::Timeout { feed, .. }
            | Self::Transport { feed, .. }
            | Self::Malformed { feed, .. } => feed,
        }
    }
}

/// One headline could not be classified; only that headline is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier rejected input: {0}")]
    InvalidInput(String),

    #[error("classifier returned a malformed answer: {0}")]
    Malformed(String),
}

/// Delivery of an alert failed. Logged, never retried for the same headline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("notifier transport failure: {0}")]
    Transport(String),

    #[error("{channel} rejected the message with HTTP {status}")]
    Rejected { channel: &'static str, status: u16 },

    #[error("notifier not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_the_feed() {
        let e = SourceFetchError::Timeout {
            feed: "Calendar".into(),
            after: Duration::from_secs(8),
        };
        assert_eq!(e.feed(), "Calendar");
        assert!(e.to_string().contains("timed out"));

        let m = SourceFetchError::malformed("RSS", "unexpected eof");
        assert_eq!(m.feed(), "RSS");
        assert!(m.to_string().contains("unexpected eof"));
    }
}
