//! # Weighting & Correlation Engine
//! Pure mapping from classified headlines to a `BiasVerdict`. No I/O, no clock,
//! no randomness: the same input always gives the same verdict.
//!
//! Steps: relevance filter → impact weight → correlation (inverted for the
//! target currency) → per-side sums → direction.

use serde::Serialize;

use crate::classify::SentimentLabel;
use crate::config::EngineConfig;
use crate::decision::{BiasVerdict, ClassifiedItem, DerivedSignal, WeightedItem};

/// Engine output: the verdict, the relevant items that fed it, and the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub verdict: BiasVerdict,
    pub weighted: Vec<WeightedItem>,
    pub excluded: Vec<ClassifiedItem>,
}

/// Whether the headline concerns the target currency or instrument.
pub fn is_relevant(item: &ClassifiedItem, cfg: &EngineConfig) -> bool {
    if let Some(code) = item.raw.currency.as_deref() {
        if item.raw.is_wildcard_currency()
            || code.eq_ignore_ascii_case(&cfg.target_currency)
            || cfg
                .instrument_aliases
                .iter()
                .any(|a| a.eq_ignore_ascii_case(code))
        {
            return true;
        }
    }
    let headline = item.raw.headline.to_lowercase();
    cfg.relevance_keywords
        .iter()
        .any(|kw| headline.contains(kw.as_str()))
}

/// Directional effect on the instrument.
///
/// Sentiment toward the target currency moves the instrument the other way;
/// anything else maps straight through. Neutral never counts.
pub fn derive_signal(item: &ClassifiedItem, cfg: &EngineConfig) -> DerivedSignal {
    let inverted = item
        .raw
        .currency
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(&cfg.target_currency));

    match (item.label(), inverted) {
        (SentimentLabel::Neutral, _) => DerivedSignal::None,
        (SentimentLabel::Positive, false) | (SentimentLabel::Negative, true) => {
            DerivedSignal::Bullish
        }
        (SentimentLabel::Negative, false) | (SentimentLabel::Positive, true) => {
            DerivedSignal::Bearish
        }
    }
}

pub fn assess(items: &[ClassifiedItem], cfg: &EngineConfig) -> Assessment {
    let mut weighted = Vec::new();
    let mut excluded = Vec::new();
    let (mut bull, mut bear) = (0u32, 0u32);

    for item in items {
        if !is_relevant(item, cfg) {
            excluded.push(item.clone());
            continue;
        }
        let weight = cfg.weights.weight_for(item.raw.impact);
        let signal = derive_signal(item, cfg);
        match signal {
            DerivedSignal::Bullish => bull += u32::from(weight),
            DerivedSignal::Bearish => bear += u32::from(weight),
            DerivedSignal::None => {}
        }
        weighted.push(WeightedItem {
            item: item.clone(),
            weight,
            signal,
        });
    }

    Assessment {
        verdict: BiasVerdict::from_powers(bull, bear),
        weighted,
        excluded,
    }
}
