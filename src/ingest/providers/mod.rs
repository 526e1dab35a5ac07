// src/ingest/providers/mod.rs
pub mod calendar;
pub mod rss;

pub use calendar::CalendarSource;
pub use rss::RssHeadlineSource;

const USER_AGENT: &str = "forex-news-bias/0.1";

/// Shared HTTP client for feed fetches. Per-request timeouts come from the orchestrator.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(4))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default reqwest client");
            reqwest::Client::new()
        })
}

/// GET a feed body, mapping transport and HTTP status failures.
pub(crate) async fn get_body(
    client: &reqwest::Client,
    url: &str,
    feed: &str,
) -> Result<String, crate::error::SourceFetchError> {
    use crate::error::SourceFetchError;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceFetchError::transport(feed, e))?;
    let resp = resp
        .error_for_status()
        .map_err(|e| SourceFetchError::transport(feed, e))?;
    resp.text()
        .await
        .map_err(|e| SourceFetchError::transport(feed, e))
}
