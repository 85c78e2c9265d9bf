//! Post-session scoring of the requirements checklist.

pub mod aggregate;
pub mod scorer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::ChecklistItem;

pub use scorer::{transcript_fragments, PostSessionScorer};

/// Stored outcome of post-session scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub session_id: String,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub final_score: f64,
    /// Some step failed; scores may be partial.
    #[serde(default)]
    pub error: bool,
}

impl AnalysisResult {
    /// Marker stored when scoring could not complete at all.
    pub fn error_marker(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            items: Vec::new(),
            category_scores: BTreeMap::new(),
            final_score: 0.0,
            error: true,
        }
    }
}
