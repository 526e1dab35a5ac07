//! Shapes produced by a cycle: classified and weighted headlines
//! and the BUY/SELL/NEUTRAL verdict.

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, SentimentLabel};
use crate::ingest::types::RawItem;

/// Final directional bias for the tracked instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

/// Effect of one headline on the instrument after correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedSignal {
    Bullish,
    Bearish,
    None,
}

/// A fetched headline together with its sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    #[serde(flatten)]
    pub raw: RawItem,
    #[serde(flatten)]
    pub sentiment: Classification,
}

impl ClassifiedItem {
    pub fn new(raw: RawItem, sentiment: Classification) -> Self {
        Self { raw, sentiment }
    }

    pub fn label(&self) -> SentimentLabel {
        self.sentiment.label
    }
}

/// A relevant headline with its weight (1..=3) and directional effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedItem {
    #[serde(flatten)]
    pub item: ClassifiedItem,
    pub weight: u8,
    pub signal: DerivedSignal,
}

/// Summed weights per side and the resulting direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasVerdict {
    pub bullish_power: u32,
    pub bearish_power: u32,
    pub direction: Direction,
}

impl BiasVerdict {
    /// Exact tie-break: only summed weight decides, equal powers are NEUTRAL.
    pub fn from_powers(bullish_power: u32, bearish_power: u32) -> Self {
        let direction = match bullish_power.cmp(&bearish_power) {
            std::cmp::Ordering::Greater => Direction::Buy,
            std::cmp::Ordering::Less => Direction::Sell,
            std::cmp::Ordering::Equal => Direction::Neutral,
        };
        Self {
            bullish_power,
            bearish_power,
            direction,
        }
    }

    /// Verdict of a cycle with no usable data.
    pub fn no_data() -> Self {
        Self::from_powers(0, 0)
    }
}

impl Default for BiasVerdict {
    fn default() -> Self {
        Self::no_data()
    }
}

/// Raw label counts over every classified headline (dashboard metrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentTally {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentTally {
    pub fn count(items: &[ClassifiedItem]) -> Self {
        items.iter().fold(Self::default(), |mut t, it| {
            match it.label() {
                SentimentLabel::Positive => t.positive += 1,
                SentimentLabel::Negative => t.negative += 1,
                SentimentLabel::Neutral => t.neutral += 1,
            }
            t
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direction_follows_powers_only() {
        assert_eq!(BiasVerdict::from_powers(3, 0).direction, Direction::Buy);
        assert_eq!(BiasVerdict::from_powers(0, 3).direction, Direction::Sell);
        assert_eq!(BiasVerdict::from_powers(2, 2).direction, Direction::Neutral);
        assert_eq!(BiasVerdict::no_data().direction, Direction::Neutral);
    }

    #[test]
    fn weighted_item_serializes_flat() {
        let raw = RawItem::new("Calendar", "2024-01-11T08:30:00-05:00", "CPI m/m")
            .unwrap()
            .with_currency("USD");
        let c = Classification::new(SentimentLabel::Positive, 0.75).unwrap();
        let w = WeightedItem {
            item: ClassifiedItem::new(raw, c),
            weight: 3,
            signal: DerivedSignal::Bearish,
        };
        let v = serde_json::to_value(&w).unwrap();
        assert_eq!(v["headline"], json!("CPI m/m"));
        assert_eq!(v["currency"], json!("USD"));
        assert_eq!(v["label"], json!("positive"));
        assert_eq!(v["weight"], json!(3));
        assert_eq!(v["signal"], json!("bearish"));

        let verdict = serde_json::to_value(BiasVerdict::from_powers(0, 3)).unwrap();
        assert_eq!(verdict["direction"], json!("SELL"));
    }
}
