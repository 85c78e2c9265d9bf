//! Broad contradiction sweep for a flagged claim.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::retriever::NeighborRetriever;
use super::types::{Claim, ConflictingClaim, ContradictionRecord, FactsState};
use crate::config::OrchestratorConfig;
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    conflicting_facts: Vec<RawConflict>,
}

#[derive(Debug, Deserialize)]
struct RawConflict {
    #[serde(default, alias = "text")]
    fact: String,
}

/// Evaluates one claim against its nearest active claims in a single judge
/// call and turns each finding into a [`ContradictionRecord`].
pub struct Guardian {
    model: SharedModel,
    neighbors: usize,
    timeout: Duration,
}

impl Guardian {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            neighbors: config.guardian_neighbors,
            timeout: config.judge_timeout(),
        }
    }

    /// Sweep `claim`. `facts` is used only to attribute conflicting texts to
    /// their origin. Failures yield no records.
    pub async fn sweep(
        &self,
        session_id: &str,
        claim: &Claim,
        retriever: &NeighborRetriever,
        facts: &FactsState,
    ) -> Vec<ContradictionRecord> {
        let others = retriever
            .others(session_id, &claim.text, &claim.id, self.neighbors)
            .await;
        if others.is_empty() {
            debug!(session_id, claim_id = %claim.id, "Guardian found no comparable claims");
            return Vec::new();
        }

        let texts: Vec<String> = others.into_iter().map(|n| n.text).collect();
        let prompt = prompts::guardian(&claim.text, &texts);
        let response = match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id, claim_id = %claim.id, error = %e, "Guardian judge failed");
                return Vec::new();
            }
        };

        let Some(findings) = parse_json::<Vec<RawFinding>>(&response) else {
            warn!(session_id, claim_id = %claim.id, "Guardian returned malformed output");
            return Vec::new();
        };

        let records: Vec<ContradictionRecord> = findings
            .into_iter()
            .filter(|f| !f.explanation.trim().is_empty())
            .map(|f| {
                let conflicting = f
                    .conflicting_facts
                    .into_iter()
                    .filter(|c| !c.fact.trim().is_empty())
                    .map(|c| ConflictingClaim {
                        origin: facts.origin_for_text(&c.fact),
                        text: c.fact.trim().to_string(),
                    })
                    .collect();
                ContradictionRecord::new(f.explanation.trim(), conflicting)
            })
            .collect();

        debug!(session_id, claim_id = %claim.id, count = records.len(), "Guardian sweep complete");
        records
    }
}
