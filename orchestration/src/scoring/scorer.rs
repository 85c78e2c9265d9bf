//! Post-session checklist scoring.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{info, warn};

use super::aggregate::{category_scores, final_score};
use super::AnalysisResult;
use crate::config::{CategoryWeighting, OrchestratorConfig};
use crate::events::{SessionEvent, SharedEventBroadcaster};
use crate::index::{transcript_collection, IndexDocument, IndexResult, MetadataFilter, SharedSimilarityIndex};
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;
use crate::store::{ChecklistItem, ItemStatus, Message, Role, SharedSessionStore};

#[derive(Debug, Deserialize)]
struct RawScore {
    score: Option<f64>,
    #[serde(default)]
    justification: String,
}

/// Scores a finished session's checklist against its transcript.
pub struct PostSessionScorer {
    model: SharedModel,
    index: SharedSimilarityIndex,
    store: SharedSessionStore,
    events: SharedEventBroadcaster,
    fragments: usize,
    timeout: Duration,
    category_weights: std::collections::BTreeMap<String, f64>,
    weighting: CategoryWeighting,
}

impl PostSessionScorer {
    pub fn new(
        model: SharedModel,
        index: SharedSimilarityIndex,
        store: SharedSessionStore,
        events: SharedEventBroadcaster,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            index,
            store,
            events,
            fragments: config.scoring_fragments,
            timeout: config.judge_timeout(),
            category_weights: config.category_weights.clone(),
            weighting: config.category_weighting,
        }
    }

    /// Score the session, persist the result and broadcast progress. Never
    /// fails: problems surface as `error: true` on the result and an
    /// `analysis.error` event when nothing could be persisted.
    pub async fn run(&self, session_id: &str) -> AnalysisResult {
        self.events.publish(
            session_id,
            SessionEvent::AnalysisStarted {
                session_id: session_id.to_string(),
            },
        );

        let record = match self.store.get_session(session_id).await {
            Ok(record) => record,
            Err(e) => return self.fail(session_id, &e.to_string()).await,
        };

        let mut had_error = false;
        if let Err(e) = self.index_transcript(session_id, &record.messages).await {
            warn!(session_id, error = %e, "Failed to index transcript");
            had_error = true;
        }

        let total = record.checklist.len();
        let completed = AtomicUsize::new(0);
        let scored = join_all(record.checklist.into_iter().map(|item| {
            let completed = &completed;
            async move {
                let item = self.score_item(session_id, item).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.events.publish(
                    session_id,
                    SessionEvent::AnalysisProgress {
                        session_id: session_id.to_string(),
                        item_id: item.id.clone(),
                        status: item.status,
                        score: item.score,
                        completed: done,
                        total,
                    },
                );
                item
            }
        }))
        .await;

        had_error |= scored.iter().any(|i| i.status == ItemStatus::Failed);
        let categories = category_scores(&scored);
        let result = AnalysisResult {
            session_id: session_id.to_string(),
            final_score: final_score(&categories, &self.category_weights, self.weighting),
            category_scores: categories,
            items: scored,
            error: had_error,
        };

        match self.store.save_analysis(session_id, result.clone()).await {
            Ok(()) => {
                info!(
                    session_id,
                    final_score = result.final_score,
                    error = result.error,
                    "Session analysis completed"
                );
                self.events
                    .publish(session_id, SessionEvent::AnalysisCompleted(result.clone()));
                result
            }
            Err(e) => self.fail(session_id, &e.to_string()).await,
        }
    }

    /// Store the error marker (best effort) and broadcast `analysis.error`.
    async fn fail(&self, session_id: &str, message: &str) -> AnalysisResult {
        warn!(session_id, error = message, "Session analysis failed");
        let marker = AnalysisResult::error_marker(session_id);
        if let Err(e) = self.store.save_analysis(session_id, marker.clone()).await {
            warn!(session_id, error = %e, "Failed to store analysis error marker");
        }
        self.events.publish(
            session_id,
            SessionEvent::AnalysisError {
                session_id: session_id.to_string(),
                message: message.to_string(),
            },
        );
        marker
    }

    async fn index_transcript(&self, session_id: &str, messages: &[Message]) -> IndexResult<()> {
        let collection = transcript_collection(session_id);
        self.index.create_collection(&collection).await?;
        for (i, text) in transcript_fragments(messages).into_iter().enumerate() {
            self.index
                .add(
                    &collection,
                    IndexDocument::new(format!("{}-{}", session_id, i), text)
                        .with_meta("source_id", session_id)
                        .with_meta("source_type", "dialogue"),
                )
                .await?;
        }
        Ok(())
    }

    async fn score_item(&self, session_id: &str, mut item: ChecklistItem) -> ChecklistItem {
        let filter = MetadataFilter::new().eq("source_type", "dialogue");
        let fragments = match self
            .index
            .search(
                &transcript_collection(session_id),
                &item.description,
                self.fragments,
                &filter,
            )
            .await
        {
            Ok(hits) if !hits.is_empty() => hits.into_iter().map(|h| h.text).collect::<Vec<_>>(),
            Ok(_) => {
                warn!(session_id, item_id = %item.id, "No transcript fragments for checklist item");
                item.status = ItemStatus::Failed;
                return item;
            }
            Err(e) => {
                warn!(session_id, item_id = %item.id, error = %e, "Fragment retrieval failed");
                item.status = ItemStatus::Failed;
                return item;
            }
        };

        let prompt = prompts::checklist_scoring(&item.description, &fragments);
        let parsed = match complete_within(self.model.as_ref(), &prompt, self.timeout).await {
            Ok(response) => parse_json::<RawScore>(&response),
            Err(e) => {
                warn!(session_id, item_id = %item.id, error = %e, "Scoring judge failed");
                None
            }
        };

        match parsed {
            Some(RawScore {
                score: Some(score),
                justification,
            }) if score.is_finite() => {
                item.score = Some(score.clamp(0.0, 10.0));
                item.justification = justification;
                item.status = ItemStatus::Evaluated;
            }
            _ => {
                item.status = ItemStatus::Failed;
            }
        }
        item
    }
}

/// Consecutive message pairs rendered as `Speaker: content` lines. A
/// single-message transcript yields one fragment. System messages are left
/// out.
pub fn transcript_fragments(messages: &[Message]) -> Vec<String> {
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Candidate",
                _ => "Interviewer",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect();

    match lines.len() {
        0 => Vec::new(),
        1 => lines,
        _ => lines.windows(2).map(|pair| pair.join("\n")).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_fragments_pairs() {
        let messages = vec![
            Message::new("s", Role::Assistant, "Tell me about Rust"),
            Message::new("s", Role::User, "I use it daily"),
            Message::new("s", Role::System, "ignored"),
            Message::new("s", Role::Assistant, "Async?"),
        ];
        let fragments = transcript_fragments(&messages);
        assert_eq!(fragments.len(), 2);
        assert_eq!(
            fragments[0],
            "Interviewer: Tell me about Rust\nCandidate: I use it daily"
        );
        assert!(fragments[1].ends_with("Interviewer: Async?"));
    }

    #[test]
    fn test_single_message_fragment() {
        let messages = vec![Message::new("s", Role::User, "hello")];
        assert_eq!(transcript_fragments(&messages), vec!["Candidate: hello"]);
        assert!(transcript_fragments(&[]).is_empty());
    }
}
