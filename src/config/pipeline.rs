// src/config/pipeline.rs
//! Pipeline configuration (TOML). Everything the engine needs to track a
//! different instrument or currency lives here, not in code.
//!
//! Lookup order for `load_default`:
//! 1) `$PIPELINE_CONFIG_PATH` (must exist)
//! 2) `config/pipeline.toml`
//! 3) built-in seed (gold vs USD, ForexFactory feeds)
//!
//! `$PIPELINE_TARGET_CURRENCY` and `$PIPELINE_INTERVAL_SECS` override the file.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    DEFAULT_PIPELINE_CONFIG_PATH, ENV_HF_API_TOKEN, ENV_INTERVAL_SECS, ENV_PIPELINE_CONFIG_PATH,
    ENV_TARGET_CURRENCY,
};
use crate::classify::finbert::DEFAULT_FINBERT_ENDPOINT;
use crate::ingest::types::ImpactLevel;

const MAX_SOURCE_LIMIT: usize = 50;
const MAX_SOURCE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Impact → weight mapping. Every rung must be 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeightLadder {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for WeightLadder {
    fn default() -> Self {
        Self {
            low: 1,
            medium: 2,
            high: 3,
        }
    }
}

impl WeightLadder {
    /// Missing impact is weighted like `low`.
    pub fn weight_for(&self, impact: Option<ImpactLevel>) -> u8 {
        match impact {
            Some(ImpactLevel::High) => self.high,
            Some(ImpactLevel::Medium) => self.medium,
            Some(ImpactLevel::Low) | None => self.low,
        }
    }

    fn validate(&self) -> Result<()> {
        for (rung, w) in [("low", self.low), ("medium", self.medium), ("high", self.high)] {
            if !(1..=3).contains(&w) {
                bail!("engine.weights.{rung} = {w}; weights must be 1, 2 or 3");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub target_currency: String,
    pub instrument_aliases: Vec<String>,
    pub relevance_keywords: Vec<String>,
    pub weights: WeightLadder,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_currency: "USD".to_string(),
            instrument_aliases: vec!["XAU".to_string(), "GOLD".to_string()],
            relevance_keywords: [
                "gold",
                "xau",
                "fed",
                "inflation",
                "usd",
                "cpi",
                "interest rate",
                "fomc",
                "nfp",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            weights: WeightLadder::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierProvider {
    #[default]
    Lexicon,
    Finbert,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub provider: ClassifierProvider,
    pub endpoint: String,
    /// Literal key, or "ENV" to read `$HF_API_TOKEN`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: ClassifierProvider::Lexicon,
            endpoint: DEFAULT_FINBERT_ENDPOINT.to_string(),
            api_key: Some("ENV".to_string()),
            timeout_secs: 10,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Only alert when the newest headline's confidence is strictly above this.
    pub min_confidence: Option<f64>,
    /// Do not alert on neutral headlines.
    pub skip_neutral: bool,
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_confidence: None,
            skip_neutral: false,
            timeout_secs: 10,
        }
    }
}

impl AlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Per-channel send budget, always below the dispatch timeout.
    pub fn channel_timeout(&self) -> Duration {
        self.timeout() * 4 / 5
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Calendar,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Currency tag stamped on every item of a feed that carries none.
    #[serde(default)]
    pub currency: Option<String>,
}

fn default_limit() -> usize {
    crate::ingest::DEFAULT_SOURCE_LIMIT
}

fn default_timeout_secs() -> u64 {
    crate::ingest::DEFAULT_SOURCE_TIMEOUT.as_secs()
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    /// Built-in seed: gold against USD from the ForexFactory news and calendar feeds.
    pub fn default_seed() -> Self {
        Self {
            engine: EngineConfig::default(),
            classifier: ClassifierConfig::default(),
            alert: AlertConfig::default(),
            scheduler: SchedulerConfig::default(),
            sources: vec![
                SourceConfig {
                    name: "ForexFactory News".to_string(),
                    kind: SourceKind::Rss,
                    url: "https://www.forexfactory.com/news/rss".to_string(),
                    limit: 15,
                    timeout_secs: 8,
                    currency: None,
                },
                SourceConfig {
                    name: "ForexFactory Calendar".to_string(),
                    kind: SourceKind::Calendar,
                    url: "https://nfs.faireconomy.media/ff_calendar_thisweek.json".to_string(),
                    limit: 10,
                    timeout_secs: 8,
                    currency: None,
                },
            ],
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PIPELINE_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from(&default_path)?
            } else {
                tracing::info!("no pipeline config file found; using built-in seed");
                Self::default_seed()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(code) = std::env::var(ENV_TARGET_CURRENCY) {
            self.engine.target_currency = code;
        }
        if let Ok(raw) = std::env::var(ENV_INTERVAL_SECS) {
            self.scheduler.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_SECS}={raw} is not a number"))?;
        }
        Ok(())
    }

    /// Normalize in place and reject what the engine cannot honor.
    pub fn validate(&mut self) -> Result<()> {
        let e = &mut self.engine;
        e.target_currency = e.target_currency.trim().to_ascii_uppercase();
        if e.target_currency.is_empty() {
            bail!("engine.target_currency must not be empty");
        }
        e.instrument_aliases = clean_list(
            e.instrument_aliases.iter().map(|a| a.to_ascii_uppercase()),
        );
        e.relevance_keywords = clean_list(e.relevance_keywords.iter().map(|k| k.to_lowercase()));
        e.weights.validate()?;

        if let Some(min) = self.alert.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                bail!("alert.min_confidence = {min}; must be within [0, 1]");
            }
        }
        self.alert.timeout_secs = self.alert.timeout_secs.clamp(1, 120);
        self.classifier.timeout_secs = self.classifier.timeout_secs.clamp(1, 120);
        self.scheduler.interval_secs = self.scheduler.interval_secs.clamp(5, 86_400);

        if self
            .classifier
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("env"))
        {
            self.classifier.api_key = std::env::var(ENV_HF_API_TOKEN).ok();
        }

        let mut names = BTreeSet::new();
        for s in &mut self.sources {
            s.name = s.name.trim().to_string();
            if s.name.is_empty() {
                bail!("every [[sources]] entry needs a name");
            }
            if !names.insert(s.name.clone()) {
                bail!("duplicate source name `{}`", s.name);
            }
            if s.url.trim().is_empty() {
                bail!("source `{}` has an empty url", s.name);
            }
            s.limit = s.limit.clamp(1, MAX_SOURCE_LIMIT);
            s.timeout_secs = s.timeout_secs.clamp(1, MAX_SOURCE_TIMEOUT_SECS);
            s.currency = s
                .currency
                .take()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty());
        }
        Ok(())
    }
}

fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const SAMPLE: &str = r#"
[engine]
target_currency = " usd "
instrument_aliases = ["xau", "XAU", ""]
relevance_keywords = ["Gold", " fed ", "gold", "Interest Rate"]

[engine.weights]
low = 1
medium = 2
high = 3

[alert]
min_confidence = 0.85

[[sources]]
name = "News"
kind = "rss"
url = "https://example.test/rss"
limit = 500

[[sources]]
name = "Calendar"
kind = "calendar"
url = "https://example.test/cal.json"
timeout_secs = 0
"#;

    #[test]
    fn channel_budget_stays_under_dispatch_timeout() {
        let a = AlertConfig::default();
        assert_eq!(a.timeout(), Duration::from_secs(10));
        assert_eq!(a.channel_timeout(), Duration::from_secs(8));
        assert!(a.channel_timeout() < a.timeout());
    }

    #[test]
    fn sample_is_normalized() {
        let cfg = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.engine.target_currency, "USD");
        assert_eq!(cfg.engine.instrument_aliases, vec!["XAU".to_string()]);
        assert_eq!(
            cfg.engine.relevance_keywords,
            vec!["fed".to_string(), "gold".to_string(), "interest rate".to_string()]
        );
        assert_eq!(cfg.alert.min_confidence, Some(0.85));
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.sources[0].limit, MAX_SOURCE_LIMIT);
        assert_eq!(cfg.sources[1].limit, crate::ingest::DEFAULT_SOURCE_LIMIT);
        assert_eq!(cfg.sources[1].timeout_secs, 1);
        assert_eq!(cfg.sources[1].kind, SourceKind::Calendar);
    }

    #[test]
    fn weight_outside_ladder_is_rejected() {
        let err = PipelineConfig::from_toml_str("[engine.weights]\nlow = 1\nmedium = 2\nhigh = 4\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("weights must be 1, 2 or 3"));
    }

    #[test]
    fn duplicate_source_names_are_rejected() {
        let toml = r#"
[[sources]]
name = "A"
kind = "rss"
url = "https://a"
[[sources]]
name = "A"
kind = "calendar"
url = "https://b"
"#;
        assert!(PipelineConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn empty_file_gives_defaults_and_no_sources() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert!(cfg.sources.is_empty());
        assert_eq!(cfg.engine.weights, WeightLadder::default());
        assert_eq!(cfg.classifier.provider, ClassifierProvider::Lexicon);
    }

    #[test]
    fn ladder_maps_missing_impact_to_low() {
        let l = WeightLadder::default();
        assert_eq!(l.weight_for(None), 1);
        assert_eq!(l.weight_for(Some(ImpactLevel::Low)), 1);
        assert_eq!(l.weight_for(Some(ImpactLevel::Medium)), 2);
        assert_eq!(l.weight_for(Some(ImpactLevel::High)), 3);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_file_then_seed() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        env::remove_var(ENV_TARGET_CURRENCY);
        env::remove_var(ENV_INTERVAL_SECS);

        // No file in the temp CWD → seed
        let seed = PipelineConfig::load_default().unwrap();
        assert_eq!(seed.sources.len(), 2);

        // Env path wins, env overrides apply on top
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[engine]\ntarget_currency = \"EUR\"\n").unwrap();
        env::set_var(ENV_PIPELINE_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_INTERVAL_SECS, "60");
        let custom = PipelineConfig::load_default().unwrap();
        assert_eq!(custom.engine.target_currency, "EUR");
        assert_eq!(custom.scheduler.interval_secs, 60);
        assert!(custom.sources.is_empty());

        // Dangling env path is an error
        env::set_var(ENV_PIPELINE_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(PipelineConfig::load_default().is_err());

        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        env::remove_var(ENV_INTERVAL_SECS);
        env::set_current_dir(&old).unwrap();
    }
}
