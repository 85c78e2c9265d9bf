//! Pairwise arbitration of a new claim against its neighbors.
//!
//! Each neighbor is judged independently, in retrieval order. Verdicts are
//! then reduced with a fixed precedence: the first `InvalidateOld` wins
//! outright (even over an earlier flag), otherwise any flag wins, otherwise
//! the claim is simply added.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::retriever::Neighbor;
use crate::config::OrchestratorConfig;
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;

/// Outcome of arbitrating one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArbitrationVerdict {
    AddNew,
    FlagContradiction { note: Option<String> },
    InvalidateOld { target_id: String },
}

impl ArbitrationVerdict {
    fn label(&self) -> &'static str {
        match self {
            Self::AddNew => "add_new",
            Self::FlagContradiction { .. } => "flag_contradiction",
            Self::InvalidateOld { .. } => "invalidate_old",
        }
    }
}

impl std::fmt::Display for ArbitrationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    action: String,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    target_fact_id: Option<String>,
}

/// Validate a pairwise judge answer for `neighbor_id` into a verdict.
///
/// Unknown actions, or an invalidation aimed at a claim other than the one
/// under judgment, degrade to [`ArbitrationVerdict::AddNew`]. A missing
/// target is filled with `neighbor_id`.
pub fn parse_verdict(response: &str, neighbor_id: &str) -> ArbitrationVerdict {
    let Some(raw) = parse_json::<RawVerdict>(response) else {
        return ArbitrationVerdict::AddNew;
    };

    match raw.action.trim().to_ascii_uppercase().as_str() {
        "ADD_NEW" => ArbitrationVerdict::AddNew,
        "FLAG_CONTRADICTION" => ArbitrationVerdict::FlagContradiction {
            note: raw.note.filter(|n| !n.trim().is_empty()),
        },
        "INVALIDATE_OLD" => match raw.target_fact_id.as_deref().map(str::trim) {
            None | Some("") => ArbitrationVerdict::InvalidateOld {
                target_id: neighbor_id.to_string(),
            },
            Some(target) if target == neighbor_id => ArbitrationVerdict::InvalidateOld {
                target_id: neighbor_id.to_string(),
            },
            Some(other) => {
                warn!(
                    neighbor_id,
                    target_id = other,
                    "Invalidation target does not match the judged claim, adding instead"
                );
                ArbitrationVerdict::AddNew
            }
        },
        other => {
            debug!(action = other, "Unknown arbitration action, adding instead");
            ArbitrationVerdict::AddNew
        }
    }
}

/// Reduce per-neighbor verdicts, in retrieval order, to a single outcome.
pub fn aggregate(verdicts: impl IntoIterator<Item = ArbitrationVerdict>) -> ArbitrationVerdict {
    let mut flagged = None;
    for verdict in verdicts {
        match verdict {
            ArbitrationVerdict::InvalidateOld { .. } => return verdict,
            ArbitrationVerdict::FlagContradiction { .. } if flagged.is_none() => {
                flagged = Some(verdict);
            }
            _ => {}
        }
    }
    flagged.unwrap_or(ArbitrationVerdict::AddNew)
}

/// Runs the pairwise judge over a claim's neighbors.
pub struct Arbitrator {
    model: SharedModel,
    timeout: Duration,
}

impl Arbitrator {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            timeout: config.judge_timeout(),
        }
    }

    /// Judge one pair. Any failure counts as `AddNew`.
    pub async fn judge_pair(&self, new_text: &str, neighbor: &Neighbor) -> ArbitrationVerdict {
        let prompt = prompts::fact_arbitrator(&neighbor.text, &neighbor.id, new_text);
        match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(response) => parse_verdict(&response, &neighbor.id),
            Err(e) => {
                warn!(neighbor_id = %neighbor.id, error = %e, "Pairwise judge failed, treating as add_new");
                ArbitrationVerdict::AddNew
            }
        }
    }

    /// Arbitrate `new_text` against `neighbors`, stopping at the first
    /// invalidation.
    pub async fn arbitrate(&self, new_text: &str, neighbors: &[Neighbor]) -> ArbitrationVerdict {
        let mut verdicts = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let verdict = self.judge_pair(new_text, neighbor).await;
            debug!(neighbor_id = %neighbor.id, decision = %verdict, "Pairwise verdict");
            let stop = matches!(verdict, ArbitrationVerdict::InvalidateOld { .. });
            verdicts.push(verdict);
            if stop {
                break;
            }
        }
        aggregate(verdicts)
    }
}
