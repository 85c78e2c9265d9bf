//! Answer-quality judge for the participant's latest reply.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;
use crate::store::{Message, Role};

/// Judge assessment of the latest answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    #[serde(default)]
    pub is_canned_answer: bool,
    #[serde(default)]
    pub is_evasive: bool,
    #[serde(default)]
    pub is_not_full_answer: bool,
    #[serde(default)]
    pub analysis: String,
}

impl QualityAssessment {
    /// Composition notes, or `None` when the answer raised no concern.
    pub fn notes(&self) -> Option<String> {
        let mut lines = Vec::new();
        if self.is_canned_answer {
            lines.push("The last answer sounds canned; ask for a concrete example from the candidate's own work.");
        }
        if self.is_evasive {
            lines.push("The last answer avoided the question; ask it again more directly.");
        }
        if self.is_not_full_answer {
            lines.push("The last answer is incomplete; ask a follow-up on the missing part.");
        }
        if lines.is_empty() {
            return None;
        }

        let mut notes = lines.join("\n");
        if !self.analysis.trim().is_empty() {
            notes.push_str("\nAnswer analysis: ");
            notes.push_str(self.analysis.trim());
        }
        Some(notes)
    }
}

pub struct QualityAnalyzer {
    model: SharedModel,
    window: usize,
    timeout: Duration,
}

impl QualityAnalyzer {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            window: config.transcript_window,
            timeout: config.judge_timeout(),
        }
    }

    /// Assess the latest answer in `transcript` (oldest first, ending with
    /// the participant's message). Skipped when no interviewer message
    /// precedes it; failures yield `None`.
    pub async fn analyze(&self, transcript: &[Message]) -> Option<QualityAssessment> {
        let (_, earlier) = transcript.split_last()?;
        if !earlier.iter().any(|m| m.role == Role::Assistant) {
            debug!("No prior interviewer message, skipping quality analysis");
            return None;
        }

        let start = transcript.len().saturating_sub(self.window);
        let prompt = prompts::quality_analyzer(&prompts::format_messages(&transcript[start..]));
        match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(response) => {
                let parsed = parse_json::<QualityAssessment>(&response);
                if parsed.is_none() {
                    warn!("Quality analyzer returned malformed output");
                }
                parsed
            }
            Err(e) => {
                warn!(error = %e, "Quality analysis failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::prompts::QUALITY_TAG;
    use std::sync::Arc;

    #[test]
    fn test_notes_only_for_concerns() {
        assert_eq!(QualityAssessment::default().notes(), None);

        let assessment = QualityAssessment {
            is_evasive: true,
            analysis: "no examples".into(),
            ..Default::default()
        };
        let notes = assessment.notes().unwrap();
        assert!(notes.contains("avoided the question"));
        assert!(notes.contains("no examples"));
    }

    #[tokio::test]
    async fn test_skipped_without_prior_reply() {
        let model = Arc::new(ScriptedModel::new());
        let analyzer = QualityAnalyzer::new(model.clone(), &OrchestratorConfig::default());
        let transcript = vec![Message::new("s", Role::User, "hi")];
        assert_eq!(analyzer.analyze(&transcript).await, None);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_analyzes_latest_answer() {
        let model = ScriptedModel::new().respond(
            QUALITY_TAG,
            r#"{"is_canned_answer": true, "is_evasive": false, "is_not_full_answer": false, "analysis": "generic"}"#,
        );
        let analyzer = QualityAnalyzer::new(Arc::new(model), &OrchestratorConfig::default());
        let transcript = vec![
            Message::new("s", Role::Assistant, "Tell me about a hard bug"),
            Message::new("s", Role::User, "I always do my best"),
        ];
        let assessment = analyzer.analyze(&transcript).await.unwrap();
        assert!(assessment.is_canned_answer);
    }
}
