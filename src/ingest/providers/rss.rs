use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::SourceFetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{RawItem, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn unix_of(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// RSS 2.0 headline feed. Titles become headlines; items carry the feed's
/// fixed currency tag when one is configured.
pub struct RssHeadlineSource {
    name: String,
    currency: Option<String>,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssHeadlineSource {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            currency: None,
            mode: Mode::Http {
                url: url.into(),
                client: super::http_client(),
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            currency: None,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn with_currency(mut self, code: Option<String>) -> Self {
        self.currency = code;
        self
    }

    fn parse_items(&self, xml: &str, limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        let rss: Rss =
            from_str(&scrub_html_entities_for_xml(xml)).map_err(|e| SourceFetchError::malformed(&self.name, e))?;

        let mut out: Vec<(Option<i64>, RawItem)> = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let headline = normalize_text(it.title.as_deref().unwrap_or_default());
            let published = it.pub_date.unwrap_or_default();
            let Some(mut raw) = RawItem::new(&self.name, published.trim(), headline) else {
                continue;
            };
            if let Some(code) = &self.currency {
                raw = raw.with_currency(code.as_str());
            }
            raw = raw.with_link(it.link.map(|l| l.trim().to_string()));
            out.push((unix_of(&raw.published_at), raw));
        }

        // Feeds are usually newest-first already; a stable sort keeps that when dates are missing.
        if out.iter().all(|(ts, _)| ts.is_some()) {
            out.sort_by(|a, b| b.0.cmp(&a.0));
        }
        Ok(out.into_iter().map(|(_, it)| it).take(limit).collect())
    }
}

#[async_trait]
impl SourceAdapter for RssHeadlineSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml, limit),
            Mode::Http { url, client } => {
                let body = super::get_body(client, url, &self.name).await?;
                self.parse_items(&body, limit)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
