// src/classify/mod.rs
//! Headline sentiment classification: the `Classifier` seam, the two adapters
//! behind it, and the per-cycle driver that applies one to every fetched item.

pub mod finbert;
pub mod lexicon;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierConfig, ClassifierProvider};
use crate::decision::ClassifiedItem;
use crate::error::ClassificationError;
use crate::ingest::headline_id;
use crate::ingest::types::RawItem;

pub use finbert::FinbertClassifier;
pub use lexicon::LexiconClassifier;

pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Some(Self::Positive),
            "negative" | "neg" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Label plus confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Classification {
    pub fn new(label: SentimentLabel, score: f64) -> Result<Self, ClassificationError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ClassificationError::Malformed(format!(
                "score {score} outside [0, 1]"
            )));
        }
        Ok(Self { label, score })
    }
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassificationError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Build the configured classifier. A remote provider without credentials
/// falls back to the local lexicon.
pub fn build_classifier(cfg: &ClassifierConfig) -> DynClassifier {
    match cfg.provider {
        ClassifierProvider::Lexicon => Arc::new(LexiconClassifier::new()),
        ClassifierProvider::Finbert => match cfg.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                Arc::new(FinbertClassifier::new(cfg.endpoint.clone(), key.to_string()))
            }
            _ => {
                tracing::warn!(
                    target: "classify",
                    "finbert selected but no API key resolved; using lexicon classifier"
                );
                Arc::new(LexiconClassifier::new())
            }
        },
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "classify_errors_total",
            "Headlines dropped because classification failed."
        );
    });
}

/// Classified items in input order and how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct ClassifyReport {
    pub items: Vec<ClassifiedItem>,
    pub failed: usize,
}

/// Classify every item once, sequentially, each call under `timeout`.
///
/// Repeated headline texts within the batch reuse the first answer. A failing
/// item is logged and dropped; the rest carry on.
pub async fn classify_all(
    items: Vec<RawItem>,
    classifier: &dyn Classifier,
    timeout: Duration,
) -> ClassifyReport {
    ensure_metrics_described();

    let mut seen: HashMap<String, Result<Classification, ClassificationError>> = HashMap::new();
    let mut report = ClassifyReport::default();

    for raw in items {
        let res = match seen.get(&raw.headline) {
            Some(prev) => prev.clone(),
            None => {
                let res = match tokio::time::timeout(timeout, classifier.classify(&raw.headline)).await {
                    Ok(r) => r,
                    Err(_) => Err(ClassificationError::Timeout(timeout)),
                };
                seen.insert(raw.headline.clone(), res.clone());
                res
            }
        };

        match res {
            Ok(c) => report.items.push(ClassifiedItem::new(raw, c)),
            Err(e) => {
                report.failed += 1;
                counter!("classify_errors_total").increment(1);
                tracing::warn!(
                    target: "classify",
                    source = %raw.source,
                    headline = %headline_id(&raw.headline),
                    provider = classifier.name(),
                    error = %e,
                    "classification failed; dropping item"
                );
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Classifier for Counting {
        async fn classify(&self, text: &str) -> Result<Classification, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("boom") {
                return Err(ClassificationError::Unavailable("model offline".into()));
            }
            Classification::new(SentimentLabel::Positive, 0.9)
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn raw(src: &str, h: &str) -> RawItem {
        RawItem::new(src, "", h).unwrap()
    }

    #[test]
    fn score_outside_unit_interval_is_rejected() {
        assert!(Classification::new(SentimentLabel::Neutral, 1.01).is_err());
        assert!(Classification::new(SentimentLabel::Neutral, -0.1).is_err());
        assert!(Classification::new(SentimentLabel::Neutral, f64::NAN).is_err());
        assert!(Classification::new(SentimentLabel::Neutral, 0.0).is_ok());
        assert!(Classification::new(SentimentLabel::Neutral, 1.0).is_ok());
    }

    #[tokio::test]
    async fn duplicates_are_classified_once_and_failures_dropped() {
        let c = Counting {
            calls: AtomicUsize::new(0),
        };
        let items = vec![
            raw("A", "Gold rallies"),
            raw("B", "Gold rallies"),
            raw("A", "boom"),
            raw("B", "CPI beats"),
        ];
        let report = classify_all(items, &c, DEFAULT_CLASSIFY_TIMEOUT).await;

        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.failed, 1);
        let heads: Vec<_> = report.items.iter().map(|i| i.raw.headline.as_str()).collect();
        assert_eq!(heads, vec!["Gold rallies", "Gold rallies", "CPI beats"]);
        assert_eq!(report.items[1].raw.source, "B");
    }

    struct Stuck;

    #[async_trait::async_trait]
    impl Classifier for Stuck {
        async fn classify(&self, _text: &str) -> Result<Classification, ClassificationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Classification::new(SentimentLabel::Neutral, 1.0)
        }
        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_classifier_counts_as_failure() {
        let report = classify_all(
            vec![raw("A", "Fed holds")],
            &Stuck,
            Duration::from_millis(50),
        )
        .await;
        assert!(report.items.is_empty());
        assert_eq!(report.failed, 1);
    }
}
