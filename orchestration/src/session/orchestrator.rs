//! Session orchestrator: runs one participant turn end-to-end.
//!
//! Ties together the fact pipeline, quality analysis, scenario progression
//! and reply composition, and owns the finish path that triggers
//! post-session scoring.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::composer::ReplyComposer;
use super::locks::TurnLocks;
use super::quality::{QualityAnalyzer, QualityAssessment};
use crate::config::OrchestratorConfig;
use crate::events::{SessionEvent, SharedEventBroadcaster, Subscription};
use crate::facts::{DocumentClaim, FactPipeline, PipelineReport};
use crate::index::{facts_collection, SharedSimilarityIndex};
use crate::model::SharedModel;
use crate::scenario::{ScenarioBlock, ScenarioProgression, ScenarioState, ScenarioUpdate};
use crate::scoring::{AnalysisResult, PostSessionScorer};
use crate::store::{ChecklistItem, Message, Role, SessionRecord, SharedSessionStore, StoreError};

/// Errors returned to the caller of a session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already finished: {0}")]
    AlreadyFinished(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SessionNotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Shared reference to SessionOrchestrator
pub type SharedSessionOrchestrator = Arc<SessionOrchestrator>;

/// Parameters for a new session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub system_prompt: String,
    pub title: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    /// Explicit scenario; derived from the checklist when absent.
    pub scenario: Option<Vec<ScenarioBlock>>,
    /// Claims from the participant's prior document.
    pub document_claims: Vec<DocumentClaim>,
    /// Opening message; generated when absent.
    pub opening_message: Option<String>,
}

impl NewSession {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_checklist(mut self, checklist: Vec<ChecklistItem>) -> Self {
        self.checklist = checklist;
        self
    }

    pub fn with_scenario(mut self, blocks: Vec<ScenarioBlock>) -> Self {
        self.scenario = Some(blocks);
        self
    }

    pub fn with_document_claims(mut self, claims: Vec<DocumentClaim>) -> Self {
        self.document_claims = claims;
        self
    }

    pub fn with_opening(mut self, text: &str) -> Self {
        self.opening_message = Some(text.to_string());
        self
    }
}

/// Result of a finish attempt.
#[derive(Debug)]
pub struct FinishOutcome {
    /// This call flipped the finished flag.
    pub newly_finished: bool,
    /// System notice persisted by the flipping call.
    pub notice: Option<Message>,
    /// Post-session scoring task, spawned by the flipping call.
    pub scoring: Option<JoinHandle<AnalysisResult>>,
}

impl FinishOutcome {
    fn already_finished() -> Self {
        Self {
            newly_finished: false,
            notice: None,
            scoring: None,
        }
    }
}

/// Everything one participant turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub reply: Message,
    /// Contradictions whose delivery was recorded with this reply.
    pub delivered_contradictions: Vec<String>,
    /// Composition failed and the static fallback reply was sent.
    pub used_fallback: bool,
    /// The misbehavior judge ended the session.
    pub forced_finish: bool,
    pub facts: PipelineReport,
    pub quality: Option<QualityAssessment>,
    pub scenario: ScenarioUpdate,
    /// Present when this turn finished the session.
    pub finish: Option<FinishOutcome>,
}

impl TurnOutcome {
    pub fn finished(&self) -> bool {
        self.finish.is_some()
    }
}

pub struct SessionOrchestrator {
    store: SharedSessionStore,
    index: SharedSimilarityIndex,
    events: SharedEventBroadcaster,
    config: OrchestratorConfig,
    pipeline: FactPipeline,
    quality: QualityAnalyzer,
    progression: ScenarioProgression,
    composer: ReplyComposer,
    scorer: Arc<PostSessionScorer>,
    locks: TurnLocks,
}

impl SessionOrchestrator {
    pub fn new(
        model: SharedModel,
        index: SharedSimilarityIndex,
        store: SharedSessionStore,
        events: SharedEventBroadcaster,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pipeline: FactPipeline::new(model.clone(), index.clone(), store.clone(), &config),
            quality: QualityAnalyzer::new(model.clone(), &config),
            progression: ScenarioProgression::new(model.clone(), store.clone(), &config),
            composer: ReplyComposer::new(model.clone(), &config),
            scorer: Arc::new(PostSessionScorer::new(
                model,
                index.clone(),
                store.clone(),
                events.clone(),
                &config,
            )),
            locks: TurnLocks::new(),
            store,
            index,
            events,
            config,
        }
    }

    /// Create a shared reference to this orchestrator
    pub fn shared(self) -> SharedSessionOrchestrator {
        Arc::new(self)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn session(&self, session_id: &str) -> SessionResult<SessionRecord> {
        Ok(self.store.get_session(session_id).await?)
    }

    /// Register a subscriber for the session's events.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        self.events.register(session_id)
    }

    /// Persist a new session, prepare its claim collection and scenario,
    /// ingest prior-document claims and post the opening message.
    pub async fn create_session(&self, new: NewSession) -> SessionResult<SessionRecord> {
        let mut record = SessionRecord::new(&new.system_prompt);
        record.title = new.title;
        record.scenario = match new.scenario {
            Some(blocks) if !blocks.is_empty() => Some(ScenarioState::new(blocks)),
            _ if !new.checklist.is_empty() => Some(ScenarioState::from_checklist(
                &new.checklist,
                self.config.default_block_duration,
            )),
            _ => None,
        };
        record.checklist = new.checklist;
        let session_id = record.id.clone();
        let first_block = record
            .scenario
            .as_ref()
            .and_then(|s| s.current_block())
            .map(|b| b.title.clone());

        self.store.create_session(record).await?;

        if let Err(e) = self
            .index
            .create_collection(&facts_collection(&session_id))
            .await
        {
            warn!(session_id = %session_id, error = %e, "Failed to create facts collection");
        }

        if !new.document_claims.is_empty() {
            if let Err(e) = self
                .pipeline
                .ledger()
                .ingest_document_claims(&session_id, new.document_claims)
                .await
            {
                warn!(session_id = %session_id, error = %e, "Failed to ingest document claims");
            }
        }

        let opening = match new.opening_message {
            Some(text) => text,
            None => {
                self.composer
                    .opening(&new.system_prompt, first_block.as_deref())
                    .await
            }
        };
        let opening = self
            .store
            .append_message(Message::new(&session_id, Role::Assistant, &opening))
            .await?;
        self.events
            .publish(&session_id, SessionEvent::MessageCreated(opening));

        info!(session_id = %session_id, "Session created");
        Ok(self.store.get_session(&session_id).await?)
    }

    /// Process one participant message and produce the interviewer's reply.
    ///
    /// Any failure before the reply is persisted removes the participant's
    /// message again and broadcasts `message.deleted` once the delete
    /// succeeded.
    pub async fn handle_message(&self, session_id: &str, content: &str) -> SessionResult<TurnOutcome> {
        if !self.config.serialize_turns {
            return self.turn(session_id, content).await;
        }

        let guard = self.locks.acquire(session_id).await;
        let result = self.turn(session_id, content).await;
        drop(guard);
        self.locks.release_idle(session_id);
        result
    }

    async fn turn(&self, session_id: &str, content: &str) -> SessionResult<TurnOutcome> {
        let record = self.store.get_session(session_id).await?;
        if record.is_finished {
            return Err(SessionError::AlreadyFinished(session_id.to_string()));
        }

        let user_message = self
            .store
            .append_message(Message::new(session_id, Role::User, content))
            .await?;
        self.events.publish(
            session_id,
            SessionEvent::MessageCreated(user_message.clone()),
        );

        match self.run_turn(&record, &user_message).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(session_id, message_id = %user_message.id, error = %e, "Turn failed, rolling back participant message");
                match self
                    .store
                    .delete_message(session_id, &user_message.id)
                    .await
                {
                    Ok(()) => self.events.publish(
                        session_id,
                        SessionEvent::MessageDeleted(user_message.id.clone()),
                    ),
                    // The message is still stored; subscribers keep it too.
                    Err(del) => {
                        warn!(session_id, message_id = %user_message.id, error = %del, "Rollback delete failed")
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_turn(&self, record: &SessionRecord, user_message: &Message) -> SessionResult<TurnOutcome> {
        let session_id = record.id.as_str();
        let transcript = self.store.list_messages(session_id).await?;

        let (quality, facts) = tokio::join!(
            self.quality.analyze(&transcript),
            self.pipeline.handle_message(session_id, user_message)
        );
        debug!(
            session_id,
            claims = facts.recorded,
            flagged = facts.flagged,
            contradictions = facts.contradictions,
            "Fact pipeline finished"
        );

        let scenario = self.progression.run(session_id, &transcript).await?;

        if scenario.force_finish {
            info!(session_id, reason = %scenario.finish_reason, "Misbehavior judge forced finish");
            let reply = self
                .persist_reply(Message::new(
                    session_id,
                    Role::Assistant,
                    &self.config.forced_finish_reply,
                ))
                .await?;
            let finish = self
                .finish_after_reply(session_id, &self.config.forced_finish_notice)
                .await;
            return Ok(TurnOutcome {
                user_message: user_message.clone(),
                reply,
                delivered_contradictions: Vec::new(),
                used_fallback: false,
                forced_finish: true,
                facts,
                quality,
                scenario,
                finish,
            });
        }

        let pending = self.pipeline.ledger().pending_contradictions(session_id).await?;
        let notes = self.composer.notes(&pending, quality.as_ref(), &scenario);

        let (text, used_fallback) = match self
            .composer
            .compose(&record.system_prompt, &transcript, &notes)
            .await
        {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(session_id, error = %e, "Reply composition failed, sending fallback reply");
                (self.config.fallback_reply.clone(), true)
            }
        };

        let reply = self
            .persist_reply(
                Message::new(session_id, Role::Assistant, &text).with_hidden_notes(Some(notes)),
            )
            .await?;

        let mut delivered = Vec::new();
        if !used_fallback && !pending.is_empty() {
            let ids: Vec<String> = pending.iter().map(|c| c.id.clone()).collect();
            match self.pipeline.ledger().mark_delivered(session_id, &ids).await {
                Ok(flipped) => {
                    info!(session_id, delivered = flipped, "Contradictions delivered");
                    delivered = ids;
                }
                Err(e) => {
                    warn!(session_id, error = %e, "Failed to mark contradictions delivered, they will be repeated");
                }
            }
        }

        let finish = if !used_fallback && self.composer.has_finish_marker(&reply.content) {
            self.finish_after_reply(session_id, &self.config.finish_notice)
                .await
        } else {
            None
        };

        Ok(TurnOutcome {
            user_message: user_message.clone(),
            reply,
            delivered_contradictions: delivered,
            used_fallback,
            forced_finish: false,
            facts,
            quality,
            scenario,
            finish,
        })
    }

    async fn persist_reply(&self, reply: Message) -> SessionResult<Message> {
        let session_id = reply.session_id.clone();
        let reply = self.store.append_message(reply).await?;
        self.events
            .publish(&session_id, SessionEvent::MessageCreated(reply.clone()));
        Ok(reply)
    }

    /// Finish once a reply exists. Errors are logged; the turn stands.
    async fn finish_after_reply(&self, session_id: &str, notice: &str) -> Option<FinishOutcome> {
        match self.finish_session(session_id, Some(notice)).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(session_id, error = %e, "Failed to finish session after reply");
                None
            }
        }
    }

    /// Mark the session finished. Only the call that flips the flag posts
    /// the system notice and starts post-session scoring.
    pub async fn finish_session(
        &self,
        session_id: &str,
        notice: Option<&str>,
    ) -> SessionResult<FinishOutcome> {
        if !self.store.mark_finished(session_id).await? {
            debug!(session_id, "Session already finished");
            return Ok(FinishOutcome::already_finished());
        }
        info!(session_id, "Session finished");
        self.locks.release(session_id);

        let notice = notice.unwrap_or(self.config.finish_notice.as_str());
        let notice = match self
            .store
            .append_message(Message::new(session_id, Role::System, notice))
            .await
        {
            Ok(message) => {
                self.events
                    .publish(session_id, SessionEvent::MessageCreated(message.clone()));
                Some(message)
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to persist finish notice");
                None
            }
        };

        let scorer = self.scorer.clone();
        let sid = session_id.to_string();
        let scoring = tokio::spawn(async move { scorer.run(&sid).await });

        Ok(FinishOutcome {
            newly_finished: true,
            notice,
            scoring: Some(scoring),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBroadcaster;
    use crate::index::InMemorySimilarityIndex;
    use crate::model::ScriptedModel;
    use crate::prompts::OPENING_TAG;
    use crate::store::{InMemorySessionStore, SessionStore};

    fn orchestrator(model: ScriptedModel) -> (SessionOrchestrator, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let orchestrator = SessionOrchestrator::new(
            Arc::new(model),
            Arc::new(InMemorySimilarityIndex::new()),
            store.clone(),
            EventBroadcaster::new().shared(),
            OrchestratorConfig::default(),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_create_session_derives_scenario_and_opening() {
        let (orchestrator, _) =
            orchestrator(ScriptedModel::new().respond(OPENING_TAG, "Hello, let's begin."));
        let record = orchestrator
            .create_session(NewSession::new("You interview Rust engineers.").with_checklist(vec![
                ChecklistItem::new("1", "Ownership", "technical_skill", 5.0),
                ChecklistItem::new("2", "Teamwork", "soft_skill", 5.0),
            ]))
            .await
            .unwrap();

        let scenario = record.scenario.unwrap();
        assert_eq!(scenario.blocks.len(), 2);
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.messages[0].content, "Hello, let's begin.");
        assert_eq!(record.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_and_finished_sessions_rejected() {
        let (orchestrator, store) = orchestrator(ScriptedModel::new().with_default("{}"));
        assert!(matches!(
            orchestrator.handle_message("missing", "hi").await.unwrap_err(),
            SessionError::NotFound(_)
        ));

        let record = orchestrator
            .create_session(NewSession::new("sys").with_opening("Hi"))
            .await
            .unwrap();
        orchestrator.finish_session(&record.id, None).await.unwrap();

        let err = orchestrator.handle_message(&record.id, "hello").await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyFinished(_)));
        // Opening + finish notice only; nothing persisted for the rejected turn.
        assert_eq!(store.list_messages(&record.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_turn_lock_dropped_after_turn() {
        let (orchestrator, _) = orchestrator(
            ScriptedModel::new()
                .respond(crate::prompts::REPLY_TAG, "Go on.")
                .with_default("{}"),
        );
        let record = orchestrator
            .create_session(NewSession::new("sys").with_opening("Hi"))
            .await
            .unwrap();

        orchestrator.handle_message(&record.id, "hello").await.unwrap();
        assert_eq!(orchestrator.locks.len(), 0);

        // Failed turns release their entry too.
        orchestrator.handle_message("missing", "hi").await.unwrap_err();
        assert_eq!(orchestrator.locks.len(), 0);
    }
}
