//! Hosted FinBERT-style classifier (Hugging Face inference API shape).
//!
//! Request: `POST {endpoint}` with `{"inputs": "<text>"}` and a bearer token.
//! Answer: `[[{"label": "positive", "score": 0.93}, ...]]` or the same list unnested.
//! The highest-scoring label wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Classification, Classifier, SentimentLabel};
use crate::error::ClassificationError;

pub const DEFAULT_FINBERT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/ProsusAI/finbert";

pub struct FinbertClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct Req<'a> {
    inputs: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Answer {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
    Error { error: String },
}

impl FinbertClassifier {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("forex-news-bias/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

/// Pick the best label out of a raw inference answer.
fn best_of(body: &str) -> Result<Classification, ClassificationError> {
    let answer: Answer = serde_json::from_str(body)
        .map_err(|e| ClassificationError::Malformed(format!("{e}")))?;
    let candidates = match answer {
        Answer::Nested(mut outer) => {
            if outer.is_empty() {
                Vec::new()
            } else {
                outer.swap_remove(0)
            }
        }
        Answer::Flat(v) => v,
        Answer::Error { error } => return Err(ClassificationError::Unavailable(error)),
    };

    let best = candidates
        .into_iter()
        .filter(|c| c.score.is_finite())
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| ClassificationError::Malformed("no labels in answer".into()))?;

    let label = SentimentLabel::parse(&best.label)
        .ok_or_else(|| ClassificationError::Malformed(format!("unknown label `{}`", best.label)))?;
    Classification::new(label, best.score)
}

#[async_trait]
impl Classifier for FinbertClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassificationError> {
        if text.trim().is_empty() {
            return Err(ClassificationError::InvalidInput("empty text".into()));
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Req { inputs: text })
            .send()
            .await
            .map_err(|e| ClassificationError::Unavailable(format!("{e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClassificationError::Unavailable(format!("{e}")))?;

        if status.is_client_error() && status.as_u16() != 429 {
            return Err(ClassificationError::InvalidInput(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ClassificationError::Unavailable(format!("HTTP {status}")));
        }
        best_of(&body)
    }

    fn name(&self) -> &'static str {
        "finbert"
    }
}
