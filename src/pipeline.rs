// src/pipeline.rs
//! One fetch → classify → assess → dispatch cycle, and the shared context
//! that owns everything a cycle touches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::classify::{build_classifier, classify_all, DynClassifier};
use crate::config::{EngineConfig, PipelineConfig, SourceConfig, SourceKind};
use crate::decision::{BiasVerdict, ClassifiedItem, SentimentTally, WeightedItem};
use crate::dispatch::{AlertCandidate, AlertDispatcher, AlertState, DispatchOutcome};
use crate::engine::{self, Assessment};
use crate::ingest::providers::{CalendarSource, RssHeadlineSource};
use crate::ingest::types::{RawItem, SourceAdapter};
use crate::ingest::{self, ConfiguredSource, SourceReport};
use crate::notify::Notifier;

/// Everything the rendering layer needs about the last committed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSnapshot {
    /// 0 until the first cycle commits.
    pub seq: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// All classified headlines, relevant or not, in merged order.
    pub items: Vec<ClassifiedItem>,
    pub weighted: Vec<WeightedItem>,
    pub excluded: Vec<ClassifiedItem>,
    pub verdict: BiasVerdict,
    pub tally: SentimentTally,
    pub sources: Vec<SourceReport>,
    pub classify_failures: usize,
    pub alert: DispatchOutcome,
}

impl CycleSnapshot {
    fn empty() -> Self {
        Self {
            seq: 0,
            completed_at: None,
            items: Vec::new(),
            weighted: Vec::new(),
            excluded: Vec::new(),
            verdict: BiasVerdict::no_data(),
            tally: SentimentTally::default(),
            sources: Vec::new(),
            classify_failures: 0,
            alert: DispatchOutcome::NoData,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Committed(Arc<CycleSnapshot>),
    /// A newer cycle was requested while this one gathered; its results were dropped.
    Superseded,
}

struct HubInner {
    sources: Vec<ConfiguredSource>,
    classifier: DynClassifier,
    classify_timeout: Duration,
    engine: EngineConfig,
    dispatcher: AlertDispatcher,
    alert_state: Mutex<AlertState>,
    generation: AtomicU64,
    committed: AtomicU64,
    tx: watch::Sender<Arc<CycleSnapshot>>,
}

/// Shared pipeline context. Cheap to clone.
#[derive(Clone)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_runs_total", "Pipeline cycles committed.");
        describe_counter!(
            "cycle_superseded_total",
            "Cycles discarded because a newer one was requested."
        );
        describe_gauge!("bias_bullish_power", "Summed bullish weight of the last cycle.");
        describe_gauge!("bias_bearish_power", "Summed bearish weight of the last cycle.");
        describe_gauge!("cycle_last_run_ts", "Unix time of the last committed cycle.");
        describe_histogram!("cycle_duration_ms", "Wall time of one cycle in milliseconds.");
    });
}

/// Build the adapter for one configured feed.
pub fn build_source(cfg: &SourceConfig) -> ConfiguredSource {
    let adapter: Arc<dyn SourceAdapter> = match cfg.kind {
        SourceKind::Rss => Arc::new(
            RssHeadlineSource::from_url(cfg.name.clone(), cfg.url.clone())
                .with_currency(cfg.currency.clone()),
        ),
        SourceKind::Calendar => Arc::new(CalendarSource::from_url(cfg.name.clone(), cfg.url.clone())),
    };
    ConfiguredSource::new(adapter)
        .with_limit(cfg.limit)
        .with_timeout(cfg.timeout())
}

impl SignalHub {
    pub fn new(
        sources: Vec<ConfiguredSource>,
        classifier: DynClassifier,
        classify_timeout: Duration,
        engine: EngineConfig,
        dispatcher: AlertDispatcher,
    ) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(CycleSnapshot::empty()));
        Self {
            inner: Arc::new(HubInner {
                sources,
                classifier,
                classify_timeout,
                engine,
                dispatcher,
                alert_state: Mutex::new(AlertState::default()),
                generation: AtomicU64::new(0),
                committed: AtomicU64::new(0),
                tx,
            }),
        }
    }

    pub fn from_config(cfg: &PipelineConfig, notifier: Arc<dyn Notifier>) -> Self {
        let sources = cfg.sources.iter().map(build_source).collect::<Vec<_>>();
        tracing::info!(
            target: "pipeline",
            feeds = sources.len(),
            target_currency = %cfg.engine.target_currency,
            "pipeline configured"
        );
        Self::new(
            sources,
            build_classifier(&cfg.classifier),
            cfg.classifier.timeout(),
            cfg.engine.clone(),
            AlertDispatcher::from_config(notifier, &cfg.alert),
        )
    }

    pub fn latest(&self) -> Arc<CycleSnapshot> {
        self.inner.tx.borrow().clone()
    }

    /// Notified each time a cycle commits.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CycleSnapshot>> {
        self.inner.tx.subscribe()
    }

    /// Run one full cycle.
    ///
    /// Gathering may overlap with other calls; committing (dispatch and
    /// publish) is serialized, and only the newest requested cycle commits.
    pub async fn run_cycle(&self) -> CycleOutcome {
        ensure_metrics_described();
        let t0 = Instant::now();
        let gen = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let fetched = ingest::run_cycle(&self.inner.sources).await;
        let newest_raw: Option<RawItem> = fetched.items.first().cloned();
        let classified = classify_all(
            fetched.items,
            self.inner.classifier.as_ref(),
            self.inner.classify_timeout,
        )
        .await;
        let assessment = engine::assess(&classified.items, &self.inner.engine);
        let candidate = newest_raw.map(|raw| newest_candidate(&raw, &classified.items, &assessment));

        let mut state = self.inner.alert_state.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != gen {
            counter!("cycle_superseded_total").increment(1);
            tracing::info!(target: "pipeline", generation = gen, "cycle superseded; discarding");
            return CycleOutcome::Superseded;
        }

        let alert = self
            .inner
            .dispatcher
            .dispatch_if_changed(&mut state, candidate.as_ref())
            .await;
        drop(state);

        let seq = self.inner.committed.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let Assessment {
            verdict,
            weighted,
            excluded,
        } = assessment;
        let snapshot = Arc::new(CycleSnapshot {
            seq,
            completed_at: Some(now),
            tally: SentimentTally::count(&classified.items),
            items: classified.items,
            weighted,
            excluded,
            verdict,
            sources: fetched.sources,
            classify_failures: classified.failed,
            alert,
        });
        self.inner.tx.send_replace(snapshot.clone());

        counter!("cycle_runs_total").increment(1);
        gauge!("bias_bullish_power").set(f64::from(verdict.bullish_power));
        gauge!("bias_bearish_power").set(f64::from(verdict.bearish_power));
        gauge!("cycle_last_run_ts").set(now.timestamp() as f64);
        histogram!("cycle_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            target: "pipeline",
            seq,
            items = snapshot.items.len(),
            relevant = snapshot.weighted.len(),
            bull = verdict.bullish_power,
            bear = verdict.bearish_power,
            direction = ?verdict.direction,
            alert = ?snapshot.alert,
            "cycle committed"
        );
        CycleOutcome::Committed(snapshot)
    }
}

/// The merged sequence's first item, joined with its classification and signal.
fn newest_candidate(
    raw: &RawItem,
    classified: &[ClassifiedItem],
    assessment: &Assessment,
) -> AlertCandidate {
    let item = classified.first().filter(|c| &c.raw == raw);
    let signal = item.and_then(|_| {
        assessment
            .weighted
            .iter()
            .find(|w| &w.item.raw == raw)
            .map(|w| w.signal)
    });
    AlertCandidate::from_raw(raw, assessment.verdict)
        .with_classification(item)
        .with_signal(signal)
}
