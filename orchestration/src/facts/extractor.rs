//! Claim extraction from a single utterance.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::types::ExtractedClaim;
use crate::config::OrchestratorConfig;
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;

/// Topic assigned when the model gives none.
pub const DEFAULT_TOPIC: &str = "general";

#[derive(Debug, Deserialize)]
struct RawClaim {
    #[serde(default, alias = "text", alias = "claim")]
    fact: String,
    #[serde(default)]
    topic: Option<String>,
}

/// Turns free text into at most N normalized claims.
pub struct FactExtractor {
    model: SharedModel,
    max_claims: usize,
    timeout: Duration,
}

impl FactExtractor {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            max_claims: config.max_claims_per_message,
            timeout: config.judge_timeout(),
        }
    }

    /// Extract claims from `utterance`. Model failures and malformed output
    /// yield an empty list.
    pub async fn extract(&self, utterance: &str) -> Vec<ExtractedClaim> {
        if utterance.trim().is_empty() || self.max_claims == 0 {
            return Vec::new();
        }

        let prompt = prompts::fact_extractor(utterance, self.max_claims);
        let response = match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Fact extraction failed, treating as no claims");
                return Vec::new();
            }
        };

        let Some(raw) = parse_json::<Vec<RawClaim>>(&response) else {
            warn!("Fact extractor returned malformed output, treating as no claims");
            return Vec::new();
        };

        let claims = normalize(raw, self.max_claims);
        debug!(count = claims.len(), "Extracted claims");
        claims
    }
}

fn normalize(raw: Vec<RawClaim>, max_claims: usize) -> Vec<ExtractedClaim> {
    raw.into_iter()
        .filter_map(|r| {
            let text = collapse_whitespace(&r.fact);
            if text.is_empty() {
                return None;
            }
            Some(ExtractedClaim {
                text,
                topic: normalize_topic(r.topic.as_deref()),
            })
        })
        .take(max_claims)
        .collect()
}

/// Trim and collapse inner runs of whitespace.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-case the topic, falling back to [`DEFAULT_TOPIC`].
pub fn normalize_topic(topic: Option<&str>) -> String {
    match topic.map(collapse_whitespace) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => DEFAULT_TOPIC.to_string(),
    }
}
