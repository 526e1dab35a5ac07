// src/dispatch.rs
//! Dedup alert dispatch: at most one alert per distinct newest headline.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::classify::{Classification, SentimentLabel};
use crate::config::AlertConfig;
use crate::decision::{BiasVerdict, ClassifiedItem, DerivedSignal};
use crate::error::NotifierError;
use crate::ingest::headline_id;
use crate::ingest::types::RawItem;
use crate::notify::{render_alert, Notifier};

/// Cursor of the last headline an alert was attempted for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub last_dispatched_headline: Option<String>,
}

/// The newest headline of a cycle with whatever the cycle learned about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCandidate {
    pub headline: String,
    pub source: String,
    pub published_at: String,
    pub link: Option<String>,
    /// `None` when the item failed classification.
    pub sentiment: Option<Classification>,
    /// `None` when the item was not relevant or not classified.
    pub signal: Option<DerivedSignal>,
    pub verdict: BiasVerdict,
}

impl AlertCandidate {
    pub fn from_raw(raw: &RawItem, verdict: BiasVerdict) -> Self {
        Self {
            headline: raw.headline.clone(),
            source: raw.source.clone(),
            published_at: raw.published_at.clone(),
            link: raw.link.clone(),
            sentiment: None,
            signal: None,
            verdict,
        }
    }

    pub fn with_classification(mut self, item: Option<&ClassifiedItem>) -> Self {
        self.sentiment = item.map(|i| i.sentiment);
        self
    }

    pub fn with_signal(mut self, signal: Option<DerivedSignal>) -> Self {
        self.signal = signal;
        self
    }
}

/// Optional gate on which new headlines are worth an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertPolicy {
    pub min_confidence: Option<f64>,
    pub skip_neutral: bool,
}

impl From<&AlertConfig> for AlertPolicy {
    fn from(cfg: &AlertConfig) -> Self {
        Self {
            min_confidence: cfg.min_confidence,
            skip_neutral: cfg.skip_neutral,
        }
    }
}

impl AlertPolicy {
    /// `Some(reason)` when the candidate should not be sent.
    fn gate(&self, c: &AlertCandidate) -> Option<String> {
        if self.skip_neutral {
            match c.sentiment {
                Some(s) if s.label == SentimentLabel::Neutral => {
                    return Some("neutral headline".to_string())
                }
                None => return Some("headline not classified".to_string()),
                _ => {}
            }
        }
        if let Some(min) = self.min_confidence {
            match c.sentiment {
                Some(s) if s.score <= min => {
                    return Some(format!("confidence {:.2} not above {:.2}", s.score, min))
                }
                None => return Some("headline not classified".to_string()),
                _ => {}
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// No items this cycle.
    NoData,
    /// Newest headline already alerted on.
    Unchanged,
    Sent,
    Failed { error: String },
    Suppressed { reason: String },
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("alerts_sent_total", "Alerts delivered.");
        describe_counter!("alerts_failed_total", "Alerts that failed or timed out.");
        describe_counter!(
            "alerts_suppressed_total",
            "New headlines held back by the alert gate."
        );
    });
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    policy: AlertPolicy,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            policy: AlertPolicy::default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(notifier: Arc<dyn Notifier>, cfg: &AlertConfig) -> Self {
        Self::new(notifier)
            .with_policy(AlertPolicy::from(cfg))
            .with_timeout(cfg.timeout())
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Alert on `newest` unless it is the headline already handled.
    ///
    /// The cursor moves to a new headline whatever the send does, so a
    /// failed or slow channel is never retried for the same headline.
    pub async fn dispatch_if_changed(
        &self,
        state: &mut AlertState,
        newest: Option<&AlertCandidate>,
    ) -> DispatchOutcome {
        ensure_metrics_described();

        let Some(candidate) = newest else {
            return DispatchOutcome::NoData;
        };
        if state.last_dispatched_headline.as_deref() == Some(candidate.headline.as_str()) {
            tracing::debug!(target: "dispatch", headline = %headline_id(&candidate.headline), "unchanged");
            return DispatchOutcome::Unchanged;
        }
        state.last_dispatched_headline = Some(candidate.headline.clone());
        let id = headline_id(&candidate.headline);

        if let Some(reason) = self.policy.gate(candidate) {
            counter!("alerts_suppressed_total").increment(1);
            tracing::info!(target: "dispatch", headline = %id, %reason, "alert suppressed");
            return DispatchOutcome::Suppressed { reason };
        }

        let message = render_alert(candidate);
        let res = match tokio::time::timeout(self.timeout, self.notifier.send(&message)).await {
            Ok(r) => r,
            Err(_) => Err(NotifierError::Timeout(self.timeout)),
        };

        match res {
            Ok(()) => {
                counter!("alerts_sent_total").increment(1);
                tracing::info!(
                    target: "dispatch",
                    headline = %id,
                    channel = self.notifier.channel(),
                    "alert sent"
                );
                DispatchOutcome::Sent
            }
            Err(NotifierError::NotConfigured(why)) => {
                tracing::debug!(target: "dispatch", headline = %id, %why, "no alert channel");
                DispatchOutcome::Failed {
                    error: format!("not configured: {why}"),
                }
            }
            Err(e) => {
                counter!("alerts_failed_total").increment(1);
                tracing::warn!(target: "dispatch", headline = %id, error = %e, "alert failed");
                DispatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        async fn send(&self, message: &str) -> Result<(), NotifierError> {
            self.sent.lock().unwrap().push(message.to_string());
            if self.fail {
                Err(NotifierError::Rejected {
                    channel: "recorder",
                    status: 500,
                })
            } else {
                Ok(())
            }
        }
        fn channel(&self) -> &'static str {
            "recorder"
        }
    }

    struct Hung(AtomicUsize);

    #[async_trait::async_trait]
    impl Notifier for Hung {
        async fn send(&self, _message: &str) -> Result<(), NotifierError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
        fn channel(&self) -> &'static str {
            "hung"
        }
    }

    fn candidate(headline: &str, label: SentimentLabel, score: f64) -> AlertCandidate {
        let raw = RawItem::new("FF News", "Tue, 09 Jan 2024 14:00:00 +0000", headline).unwrap();
        let item = ClassifiedItem::new(raw.clone(), Classification::new(label, score).unwrap());
        AlertCandidate::from_raw(&raw, BiasVerdict::no_data()).with_classification(Some(&item))
    }

    #[tokio::test]
    async fn alerts_once_per_distinct_headline() {
        let rec = Arc::new(Recorder::default());
        let d = AlertDispatcher::new(rec.clone());
        let mut state = AlertState::default();
        let a = candidate("A", SentimentLabel::Positive, 0.9);
        let b = candidate("B", SentimentLabel::Negative, 0.9);

        assert_eq!(d.dispatch_if_changed(&mut state, Some(&a)).await, DispatchOutcome::Sent);
        assert_eq!(d.dispatch_if_changed(&mut state, Some(&a)).await, DispatchOutcome::Unchanged);
        assert_eq!(d.dispatch_if_changed(&mut state, Some(&b)).await, DispatchOutcome::Sent);

        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("\nA\n"));
        assert!(sent[1].contains("\nB\n"));
        assert_eq!(state.last_dispatched_headline.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn no_items_leaves_state_alone() {
        let rec = Arc::new(Recorder::default());
        let d = AlertDispatcher::new(rec.clone());
        let mut state = AlertState {
            last_dispatched_headline: Some("A".into()),
        };
        assert_eq!(d.dispatch_if_changed(&mut state, None).await, DispatchOutcome::NoData);
        assert_eq!(state.last_dispatched_headline.as_deref(), Some("A"));
        assert!(rec.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_send_still_advances_cursor() {
        let rec = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let d = AlertDispatcher::new(rec.clone());
        let mut state = AlertState::default();
        let a = candidate("A", SentimentLabel::Positive, 0.9);

        let first = d.dispatch_if_changed(&mut state, Some(&a)).await;
        assert!(matches!(first, DispatchOutcome::Failed { .. }));
        assert_eq!(d.dispatch_if_changed(&mut state, Some(&a)).await, DispatchOutcome::Unchanged);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_notifier_times_out_and_advances_cursor() {
        let hung = Arc::new(Hung(AtomicUsize::new(0)));
        let d = AlertDispatcher::new(hung.clone()).with_timeout(Duration::from_secs(2));
        let mut state = AlertState::default();
        let a = candidate("A", SentimentLabel::Positive, 0.9);

        let out = d.dispatch_if_changed(&mut state, Some(&a)).await;
        assert!(matches!(out, DispatchOutcome::Failed { ref error } if error.contains("timed out")));
        assert_eq!(state.last_dispatched_headline.as_deref(), Some("A"));
        assert_eq!(hung.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gate_suppresses_but_advances_cursor() {
        let rec = Arc::new(Recorder::default());
        let d = AlertDispatcher::new(rec.clone()).with_policy(AlertPolicy {
            min_confidence: Some(0.85),
            skip_neutral: true,
        });
        let mut state = AlertState::default();

        let weak = candidate("weak", SentimentLabel::Positive, 0.6);
        assert!(matches!(
            d.dispatch_if_changed(&mut state, Some(&weak)).await,
            DispatchOutcome::Suppressed { .. }
        ));
        assert_eq!(state.last_dispatched_headline.as_deref(), Some("weak"));

        let flat = candidate("flat", SentimentLabel::Neutral, 0.99);
        assert!(matches!(
            d.dispatch_if_changed(&mut state, Some(&flat)).await,
            DispatchOutcome::Suppressed { .. }
        ));

        let strong = candidate("strong", SentimentLabel::Negative, 0.9);
        assert_eq!(d.dispatch_if_changed(&mut state, Some(&strong)).await, DispatchOutcome::Sent);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confidence_at_threshold_is_suppressed() {
        let rec = Arc::new(Recorder::default());
        let d = AlertDispatcher::new(rec.clone()).with_policy(AlertPolicy {
            min_confidence: Some(0.85),
            skip_neutral: false,
        });
        let mut state = AlertState::default();

        let edge = candidate("edge", SentimentLabel::Positive, 0.85);
        let out = d.dispatch_if_changed(&mut state, Some(&edge)).await;
        assert!(matches!(out, DispatchOutcome::Suppressed { ref reason } if reason.contains("not above")));

        let over = candidate("over", SentimentLabel::Positive, 0.851);
        assert_eq!(d.dispatch_if_changed(&mut state, Some(&over)).await, DispatchOutcome::Sent);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }

    struct Shared(Arc<Recorder>);

    #[async_trait::async_trait]
    impl Notifier for Shared {
        async fn send(&self, message: &str) -> Result<(), NotifierError> {
            self.0.send(message).await
        }
        fn channel(&self) -> &'static str {
            "shared"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_channel_in_mux_does_not_fail_dispatch() {
        let rec = Arc::new(Recorder::default());
        let mux = crate::notify::NotifierMux::new()
            .with(Hung(AtomicUsize::new(0)))
            .with(Shared(rec.clone()));
        let d = AlertDispatcher::new(Arc::new(mux));
        let mut state = AlertState::default();
        let a = candidate("A", SentimentLabel::Positive, 0.9);

        assert_eq!(d.dispatch_if_changed(&mut state, Some(&a)).await, DispatchOutcome::Sent);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn default_policy_lets_everything_through() {
        let raw = RawItem::new("s", "", "unclassified").unwrap();
        let c = AlertCandidate::from_raw(&raw, BiasVerdict::no_data());
        assert_eq!(AlertPolicy::default().gate(&c), None);
    }
}
