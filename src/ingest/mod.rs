// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::SourceFetchError;
use crate::ingest::types::{RawItem, SourceAdapter};

pub const DEFAULT_SOURCE_LIMIT: usize = 10;
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(8);

const MAX_HEADLINE_CHARS: usize = 300;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Headlines kept after normalization.");
        describe_counter!(
            "source_fetch_errors_total",
            "Feed fetches that timed out or failed."
        );
        describe_histogram!("source_fetch_ms", "Per-feed fetch time in milliseconds.");
    });
}

/// Normalize a headline: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_HEADLINE_CHARS {
        out = out.chars().take(MAX_HEADLINE_CHARS).collect();
    }
    out
}

/// Short stable id for a headline, so logs don't carry raw text.
pub(crate) fn headline_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// A feed plus its per-cycle budget.
#[derive(Clone)]
pub struct ConfiguredSource {
    pub adapter: Arc<dyn SourceAdapter>,
    pub limit: usize,
    pub timeout: Duration,
}

impl ConfiguredSource {
    pub fn new(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            adapter,
            limit: DEFAULT_SOURCE_LIMIT,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }
}

/// How one feed fared this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Merged items in configuration order, plus per-feed outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub items: Vec<RawItem>,
    pub sources: Vec<SourceReport>,
}

impl FetchReport {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Fetch every feed concurrently, each under its own timeout.
///
/// A failing feed contributes nothing and is logged; it never fails the call.
/// Items are merged in configuration order, each feed newest-first.
pub async fn run_cycle(sources: &[ConfiguredSource]) -> FetchReport {
    ensure_metrics_described();

    let mut set = JoinSet::new();
    for (idx, src) in sources.iter().enumerate() {
        let src = src.clone();
        set.spawn(async move {
            let t0 = Instant::now();
            let res = fetch_one(&src).await;
            histogram!("source_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            (idx, res)
        });
    }

    let mut slots: Vec<Option<Result<Vec<RawItem>, SourceFetchError>>> =
        (0..sources.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => slots[idx] = Some(res),
            Err(e) => tracing::error!(target: "ingest", error = %e, "feed task aborted"),
        }
    }

    let mut report = FetchReport::default();
    for (src, slot) in sources.iter().zip(slots) {
        let name = src.name().to_string();
        let res = slot.unwrap_or_else(|| {
            Err(SourceFetchError::Transport {
                feed: name.clone(),
                message: "fetch task panicked".to_string(),
            })
        });
        match res {
            Ok(items) => {
                counter!("ingest_items_total").increment(items.len() as u64);
                report.sources.push(SourceReport {
                    name,
                    fetched: items.len(),
                    error: None,
                });
                report.items.extend(items);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %name, error = %e, "feed failed; skipping");
                counter!("source_fetch_errors_total", "source" => name.clone()).increment(1);
                report.sources.push(SourceReport {
                    name,
                    fetched: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    tracing::info!(
        target: "ingest",
        items = report.items.len(),
        failed = report.failed_sources(),
        feeds = sources.len(),
        "fetch pass complete"
    );
    report
}

async fn fetch_one(src: &ConfiguredSource) -> Result<Vec<RawItem>, SourceFetchError> {
    let fetched = tokio::time::timeout(src.timeout, src.adapter.fetch(src.limit))
        .await
        .map_err(|_| SourceFetchError::Timeout {
            feed: src.name().to_string(),
            after: src.timeout,
        })??;

    Ok(fetched
        .into_iter()
        .filter_map(|mut it| {
            it.headline = normalize_text(&it.headline);
            (!it.headline.is_empty()).then_some(it)
        })
        .take(src.limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Vec<&'static str>);

    #[async_trait::async_trait]
    impl SourceAdapter for Fixed {
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
            Ok(self
                .1
                .iter()
                .map(|h| RawItem {
                    source: self.0.to_string(),
                    published_at: String::new(),
                    headline: h.to_string(),
                    currency: None,
                    impact: None,
                    link: None,
                })
                .collect())
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let s = "  <b>Gold</b>&nbsp;&nbsp; &ldquo;rallies&rdquo;\n again ";
        assert_eq!(normalize_text(s), r#"Gold "rallies" again"#);
    }

    #[tokio::test]
    async fn cap_is_enforced_even_if_adapter_ignores_it() {
        let src = ConfiguredSource::new(Arc::new(Fixed("A", vec!["1", "2", "3", "4"])))
            .with_limit(2);
        let report = run_cycle(&[src]).await;
        let heads: Vec<_> = report.items.iter().map(|i| i.headline.as_str()).collect();
        assert_eq!(heads, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn blank_after_normalization_is_dropped() {
        let src = ConfiguredSource::new(Arc::new(Fixed("A", vec!["<br/>", "CPI beats"])));
        let report = run_cycle(&[src]).await;
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].headline, "CPI beats");
        assert_eq!(report.sources[0].fetched, 1);
    }

    #[tokio::test]
    async fn merge_follows_configuration_order() {
        let a = ConfiguredSource::new(Arc::new(Fixed("A", vec!["a1", "a2"])));
        let b = ConfiguredSource::new(Arc::new(Fixed("B", vec!["b1"])));
        let report = run_cycle(&[b, a]).await;
        let heads: Vec<_> = report.items.iter().map(|i| i.headline.as_str()).collect();
        assert_eq!(heads, vec!["b1", "a1", "a2"]);
    }
}
