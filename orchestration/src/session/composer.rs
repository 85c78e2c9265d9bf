//! Reply composition and the opening message.

use std::time::Duration;

use tracing::warn;

use super::quality::QualityAssessment;
use crate::config::OrchestratorConfig;
use crate::facts::{ClaimOrigin, ContradictionRecord};
use crate::model::{complete_within, ModelError, ModelResult, SharedModel};
use crate::prompts;
use crate::scenario::ScenarioUpdate;
use crate::store::Message;

pub struct ReplyComposer {
    model: SharedModel,
    timeout: Duration,
    finish_marker: String,
    opening_fallback: String,
}

impl ReplyComposer {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            timeout: config.judge_timeout(),
            finish_marker: config.finish_marker.clone(),
            opening_fallback: config.opening_fallback.clone(),
        }
    }

    /// Hidden composition notes from pending contradictions, the quality
    /// assessment and the scenario position, in that order.
    pub fn notes(
        &self,
        contradictions: &[ContradictionRecord],
        quality: Option<&QualityAssessment>,
        scenario: &ScenarioUpdate,
    ) -> String {
        let mut sections = Vec::new();
        if let Some(section) = contradiction_notes(contradictions) {
            sections.push(section);
        }
        if let Some(section) = quality.and_then(QualityAssessment::notes) {
            sections.push(section);
        }
        if let Some(section) = scenario.notes(&self.finish_marker) {
            sections.push(section);
        }
        sections.join("\n\n")
    }

    /// Compose the interviewer's next message.
    pub async fn compose(
        &self,
        system_prompt: &str,
        transcript: &[Message],
        notes: &str,
    ) -> ModelResult<String> {
        let prompt = prompts::reply(
            system_prompt,
            &render_transcript(transcript),
            notes,
            &self.finish_marker,
        );
        let text = complete_within(self.model.as_ref(), &prompt, self.timeout).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// First interviewer message; falls back to a static greeting.
    pub async fn opening(&self, system_prompt: &str, first_block: Option<&str>) -> String {
        let prompt = prompts::opening(system_prompt, first_block);
        match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Opening message was empty, using fallback greeting");
                self.opening_fallback.clone()
            }
            Err(e) => {
                warn!(error = %e, "Opening message generation failed, using fallback greeting");
                self.opening_fallback.clone()
            }
        }
    }

    pub fn has_finish_marker(&self, text: &str) -> bool {
        text.contains(&self.finish_marker)
    }
}

fn contradiction_notes(records: &[ContradictionRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut lines = vec![
        "The candidate's statements contradict each other. Politely ask them to clarify:".to_string(),
    ];
    for record in records {
        let conflicting = record
            .conflicting
            .iter()
            .map(|c| match &c.origin {
                Some(ClaimOrigin::Resume) => format!("\"{}\" (from the resume)", c.text),
                _ => format!("\"{}\"", c.text),
            })
            .collect::<Vec<_>>();
        if conflicting.is_empty() {
            lines.push(format!("- {}", record.explanation));
        } else {
            lines.push(format!(
                "- {} Conflicts with: {}",
                record.explanation,
                conflicting.join(", ")
            ));
        }
    }
    Some(lines.join("\n"))
}

/// Transcript for the reply prompt. Earlier hidden notes stay out: they
/// carry contradictions that were already delivered.
fn render_transcript(messages: &[Message]) -> String {
    prompts::format_messages(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::ConflictingClaim;
    use crate::model::ScriptedModel;
    use crate::prompts::{OPENING_TAG, REPLY_TAG};
    use crate::store::Role;
    use std::sync::Arc;

    fn composer(model: ScriptedModel) -> ReplyComposer {
        ReplyComposer::new(Arc::new(model), &OrchestratorConfig::default())
    }

    #[test]
    fn test_notes_order_and_content() {
        let composer = composer(ScriptedModel::new());
        let record = ContradictionRecord::new(
            "Vue experience does not match the first project date",
            vec![ConflictingClaim {
                text: "5 years of Vue".into(),
                origin: Some(ClaimOrigin::Resume),
            }],
        );
        let quality = QualityAssessment {
            is_not_full_answer: true,
            ..Default::default()
        };

        let notes = composer.notes(&[record], Some(&quality), &ScenarioUpdate::default());
        let contradiction_at = notes.find("Vue experience does not match").unwrap();
        let quality_at = notes.find("incomplete").unwrap();
        assert!(contradiction_at < quality_at);
        assert!(notes.contains("(from the resume)"));
    }

    #[test]
    fn test_empty_notes() {
        let composer = composer(ScriptedModel::new());
        assert!(composer.notes(&[], None, &ScenarioUpdate::default()).is_empty());
    }

    #[tokio::test]
    async fn test_compose_rejects_blank() {
        let composer = composer(ScriptedModel::new().respond(REPLY_TAG, "   "));
        let err = composer.compose("sys", &[], "").await.unwrap_err();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_transcript_omits_earlier_notes() {
        let model = Arc::new(ScriptedModel::new().respond(REPLY_TAG, "Next question"));
        let composer = ReplyComposer::new(model.clone(), &OrchestratorConfig::default());
        let transcript = vec![
            Message::new("s", Role::Assistant, "Hello")
                .with_hidden_notes(Some("Ask about the Vue timeline".into())),
            Message::new("s", Role::User, "Hi"),
        ];
        assert_eq!(composer.compose("sys", &transcript, "").await.unwrap(), "Next question");

        let prompt = &model.calls()[0];
        assert!(prompt.contains("assistant: Hello\nuser: Hi"));
        assert!(!prompt.contains("Vue timeline"));
    }

    #[tokio::test]
    async fn test_opening_fallback() {
        let config = OrchestratorConfig::default();
        let composer = composer(ScriptedModel::new().fail(OPENING_TAG));
        assert_eq!(composer.opening("sys", None).await, config.opening_fallback);
        assert!(composer.has_finish_marker("Bye *FINISH CALL*"));
    }
}
