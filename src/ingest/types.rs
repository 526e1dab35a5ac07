// src/ingest/types.rs
use serde::{Deserialize, Serialize};

use crate::error::SourceFetchError;

/// Currency tag meaning "affects every currency".
pub const WILDCARD_CURRENCY: &str = "ALL";

/// Severity of an economic event as published by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    /// Lenient parse of feed labels ("High", "med", "3", ...).
    /// Anything else ("Holiday", "Non-Economic", "") is no impact at all.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Some(Self::Low),
            "medium" | "med" | "moderate" | "2" => Some(Self::Medium),
            "high" | "3" => Some(Self::High),
            _ => None,
        }
    }
}

/// One normalized headline produced by a feed. Immutable, scoped to one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub source: String,
    /// Publication time exactly as the feed gave it.
    pub published_at: String,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl RawItem {
    /// Returns `None` for a blank headline.
    pub fn new(
        source: impl Into<String>,
        published_at: impl Into<String>,
        headline: impl Into<String>,
    ) -> Option<Self> {
        let headline = headline.into();
        if headline.trim().is_empty() {
            return None;
        }
        Some(Self {
            source: source.into(),
            published_at: published_at.into(),
            headline,
            currency: None,
            impact: None,
            link: None,
        })
    }

    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        let code = code.into().trim().to_ascii_uppercase();
        self.currency = (!code.is_empty()).then_some(code);
        self
    }

    pub fn with_impact(mut self, impact: Option<ImpactLevel>) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn is_wildcard_currency(&self) -> bool {
        self.currency
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(WILDCARD_CURRENCY))
    }
}

/// A headline feed. Returns at most `limit` items, newest first.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceFetchError>;
    fn name(&self) -> &str;
}
