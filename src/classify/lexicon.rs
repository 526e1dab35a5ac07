use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{Classification, Classifier, SentimentLabel};
use crate::error::ClassificationError;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// |net| at which a polar headline reaches full confidence.
const NET_CAP: i32 = 4;
/// Lexicon hits at which a balanced headline bottoms out at 0.5 confidence.
const HITS_CAP: usize = 5;

/// Local word-list classifier. Cheap, deterministic, and always available.
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Net lexicon score and number of lexicon hits.
    /// A negator within the three preceding tokens flips a word's sign.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut net = 0i32;
        let mut hits = 0usize;

        for (i, tok) in tokens.iter().enumerate() {
            let base = *LEXICON.get(tok.as_str()).unwrap_or(&0);
            if base == 0 {
                continue;
            }
            hits += 1;
            let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
            net += if negated { -base } else { base };
        }
        (net, hits)
    }

    fn classify_sync(&self, text: &str) -> Result<Classification, ClassificationError> {
        if text.trim().is_empty() {
            return Err(ClassificationError::InvalidInput("empty text".into()));
        }
        let (net, hits) = self.score_text(text);
        let (label, score) = match net.signum() {
            1 => (SentimentLabel::Positive, polar_confidence(net)),
            -1 => (SentimentLabel::Negative, polar_confidence(net)),
            _ => (
                SentimentLabel::Neutral,
                1.0 - 0.5 * (hits.min(HITS_CAP) as f64 / HITS_CAP as f64),
            ),
        };
        Classification::new(label, score)
    }
}

fn polar_confidence(net: i32) -> f64 {
    0.5 + 0.5 * (net.abs().min(NET_CAP) as f64 / NET_CAP as f64)
}

#[async_trait]
impl Classifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassificationError> {
        self.classify_sync(text)
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

/// Lower-cased alphanumeric tokens; hyphenated words stay whole ("sell-off").
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|t| t.trim_matches(|c| c == '-' || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot"
            | "without" | "fails" | "failed"
    )
}
