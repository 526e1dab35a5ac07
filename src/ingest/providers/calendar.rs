//! Economic-calendar feed (ForexFactory-style weekly JSON export).
//!
//! Each entry is `{ "title", "country", "date", "impact", ... }`. Only events that
//! have already happened are reported, newest first; `country` is the currency code.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

use crate::error::SourceFetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{ImpactLevel, RawItem, SourceAdapter};

#[derive(Debug, Deserialize)]
struct CalendarEvent {
    title: String,
    #[serde(default)]
    country: Option<String>,
    date: String,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    forecast: Option<String>,
    #[serde(default)]
    previous: Option<String>,
}

pub struct CalendarSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl CalendarSource {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client: super::http_client(),
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, json: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    /// Parse a calendar body as seen at `now`.
    pub fn parse_events(
        &self,
        body: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RawItem>, SourceFetchError> {
        let events: Vec<CalendarEvent> =
            serde_json::from_str(body).map_err(|e| SourceFetchError::malformed(&self.name, e))?;

        let mut released: Vec<(DateTime<FixedOffset>, RawItem)> = events
            .into_iter()
            .filter_map(|ev| {
                let at = DateTime::parse_from_rfc3339(ev.date.trim()).ok()?;
                if at.with_timezone(&Utc) > now {
                    return None;
                }
                let mut headline = normalize_text(&ev.title);
                if let Some(extra) = figures(ev.forecast.as_deref(), ev.previous.as_deref()) {
                    headline = format!("{headline} ({extra})");
                }
                let item = RawItem::new(&self.name, ev.date.trim(), headline)?
                    .with_impact(ev.impact.as_deref().and_then(ImpactLevel::parse));
                let item = match ev.country {
                    Some(c) => item.with_currency(c),
                    None => item,
                };
                Some((at, item))
            })
            .collect();

        released.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(released.into_iter().map(|(_, it)| it).take(limit).collect())
    }
}

fn figures(forecast: Option<&str>, previous: Option<&str>) -> Option<String> {
    let f = forecast.map(str::trim).filter(|s| !s.is_empty());
    let p = previous.map(str::trim).filter(|s| !s.is_empty());
    match (f, p) {
        (Some(f), Some(p)) => Some(format!("forecast {f}, previous {p}")),
        (Some(f), None) => Some(format!("forecast {f}")),
        (None, Some(p)) => Some(format!("previous {p}")),
        (None, None) => None,
    }
}

#[async_trait]
impl SourceAdapter for CalendarSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceFetchError> {
        match &self.mode {
            Mode::Fixture(body) => self.parse_events(body, limit, Utc::now()),
            Mode::Http { url, client } => {
                let body = super::get_body(client, url, &self.name).await?;
                self.parse_events(&body, limit, Utc::now())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WEEK: &str = r#"[
      {"title":"CPI m/m","country":"USD","date":"2024-01-11T08:30:00-05:00","impact":"High","forecast":"0.2%","previous":"0.1%"},
      {"title":"Bank Holiday","country":"JPY","date":"2024-01-08T00:00:00-05:00","impact":"Holiday","forecast":"","previous":""},
      {"title":"German Factory Orders m/m","country":"EUR","date":"2024-01-09T02:00:00-05:00","impact":"Low"},
      {"title":"Unemployment Claims","country":"USD","date":"2024-01-12T08:30:00-05:00","impact":"Medium"}
    ]"#;

    #[test]
    fn keeps_released_events_newest_first() {
        let src = CalendarSource::from_fixture("Calendar", WEEK);
        let now = Utc.with_ymd_and_hms(2024, 1, 11, 20, 0, 0).unwrap();
        let items = src.parse_events(WEEK, 10, now).unwrap();

        let heads: Vec<_> = items.iter().map(|i| i.headline.as_str()).collect();
        assert_eq!(
            heads,
            vec![
                "CPI m/m (forecast 0.2%, previous 0.1%)",
                "German Factory Orders m/m",
                "Bank Holiday",
            ]
        );
        assert_eq!(items[0].currency.as_deref(), Some("USD"));
        assert_eq!(items[0].impact, Some(ImpactLevel::High));
        assert_eq!(items[1].impact, Some(ImpactLevel::Low));
        assert_eq!(items[2].impact, None);
        assert_eq!(items[0].published_at, "2024-01-11T08:30:00-05:00");
    }

    #[test]
    fn limit_applies_after_sorting() {
        let src = CalendarSource::from_fixture("Calendar", WEEK);
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let items = src.parse_events(WEEK, 1, now).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].headline, "Unemployment Claims");
    }

    #[test]
    fn non_json_is_malformed() {
        let src = CalendarSource::from_fixture("Calendar", "");
        let err = src.parse_events("<xml/>", 5, Utc::now()).unwrap_err();
        assert!(matches!(err, SourceFetchError::Malformed { .. }));
    }
}
