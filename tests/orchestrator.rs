// tests/orchestrator.rs
//
// Concurrent multi-feed fetch: partial failure isolation, timeouts and merge order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forex_news_bias::error::SourceFetchError;
use forex_news_bias::ingest::providers::{CalendarSource, RssHeadlineSource};
use forex_news_bias::ingest::types::{ImpactLevel, RawItem, SourceAdapter};
use forex_news_bias::ingest::{run_cycle, ConfiguredSource};

struct Fixed {
    name: &'static str,
    count: usize,
}

#[async_trait]
impl SourceAdapter for Fixed {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        Ok((0..self.count.min(limit))
            .filter_map(|i| RawItem::new(self.name, "", format!("{} headline {i}", self.name)))
            .collect())
    }
    fn name(&self) -> &str {
        self.name
    }
}

struct Hung;

#[async_trait]
impl SourceAdapter for Hung {
    async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
    fn name(&self) -> &str {
        "hung"
    }
}

struct Broken;

#[async_trait]
impl SourceAdapter for Broken {
    async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        Err(SourceFetchError::transport("broken", "connection reset"))
    }
    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_feed_does_not_cost_the_others() {
    let sources = vec![
        ConfiguredSource::new(Arc::new(Fixed { name: "A", count: 5 })),
        ConfiguredSource::new(Arc::new(Hung)).with_timeout(Duration::from_secs(8)),
    ];

    let report = run_cycle(&sources).await;

    assert_eq!(report.items.len(), 5);
    assert!(report.items.iter().all(|i| i.source == "A"));
    assert_eq!(report.failed_sources(), 1);
    let hung = &report.sources[1];
    assert_eq!(hung.name, "hung");
    assert_eq!(hung.fetched, 0);
    assert!(hung.error.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn failing_feed_is_reported_and_skipped() {
    let sources = vec![
        ConfiguredSource::new(Arc::new(Broken)),
        ConfiguredSource::new(Arc::new(Fixed { name: "B", count: 2 })),
    ];
    let report = run_cycle(&sources).await;

    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].headline, "B headline 0");
    assert!(report.sources[0].error.is_some());
    assert!(report.sources[1].error.is_none());
}

#[tokio::test]
async fn all_feeds_failing_gives_empty_result() {
    let sources = vec![ConfiguredSource::new(Arc::new(Broken))];
    let report = run_cycle(&sources).await;
    assert!(report.items.is_empty());
    assert_eq!(report.failed_sources(), 1);
}

#[tokio::test]
async fn fixture_feeds_merge_in_configuration_order() {
    let xml = std::fs::read_to_string("tests/fixtures/forex_news.xml").expect("rss fixture");
    let json = std::fs::read_to_string("tests/fixtures/calendar.json").expect("calendar fixture");

    let sources = vec![
        ConfiguredSource::new(Arc::new(RssHeadlineSource::from_fixture("FF News", &xml))).with_limit(3),
        ConfiguredSource::new(Arc::new(CalendarSource::from_fixture("FF Calendar", &json))),
    ];
    let report = run_cycle(&sources).await;

    let headlines: Vec<&str> = report.items.iter().map(|i| i.headline.as_str()).collect();
    assert_eq!(
        headlines,
        vec![
            "Gold rallies to record as yields slump",
            "Nikkei climbs on weak yen",
            "Fed's Waller: inflation fight \"not over\"",
            "ISM Services PMI (forecast 52.6, previous 52.7)",
            "Non-Farm Employment Change (forecast 170K, previous 199K)",
            "ECB President Lagarde Speaks",
            "Bank Holiday",
        ]
    );

    let nfp = &report.items[4];
    assert_eq!(nfp.source, "FF Calendar");
    assert_eq!(nfp.currency.as_deref(), Some("USD"));
    assert_eq!(nfp.impact, Some(ImpactLevel::High));
    assert_eq!(report.items[6].impact, None);
    assert_eq!(
        report.items[0].link.as_deref(),
        Some("https://example.test/news/gold-rallies")
    );
}
