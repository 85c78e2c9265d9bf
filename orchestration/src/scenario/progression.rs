//! Per-turn scenario progression against the stored state.

use tracing::{debug, info, warn};

use super::checker::ScenarioChecker;
use super::state::{ScenarioBlock, ScenarioState, ScenarioTransition};
use crate::config::OrchestratorConfig;
use crate::model::SharedModel;
use crate::store::{Message, SharedSessionStore, StoreError, StoreResult};

/// Result of one progression step, consumed by reply composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioUpdate {
    /// Block in effect after this turn.
    pub current_block: Option<ScenarioBlock>,
    pub block_index: usize,
    pub total_blocks: usize,
    pub turn_counter: u32,
    pub transition: Option<ScenarioTransition>,
    pub comment: String,
    /// The misbehavior judge asked to end the session now.
    pub force_finish: bool,
    pub finish_reason: String,
    /// Every block is done.
    pub terminal: bool,
}

impl ScenarioUpdate {
    /// Composition notes describing the scenario position, or `None` when
    /// the session runs without a scenario.
    pub fn notes(&self, finish_marker: &str) -> Option<String> {
        if self.terminal {
            return Some(format!(
                "All interview topics are covered. Thank the candidate, close the interview and end your message with {}.",
                finish_marker
            ));
        }
        let block = self.current_block.as_ref()?;

        let mut lines = Vec::new();
        if let Some(transition) = &self.transition {
            lines.push(format!(
                "The topic \"{}\" is finished. Move on to the topic \"{}\".",
                transition.from,
                transition.to.as_deref().unwrap_or_default()
            ));
        }
        lines.push(format!(
            "Current topic ({}/{}): \"{}\", turn {} of about {}.",
            self.block_index + 1,
            self.total_blocks,
            block.title,
            self.turn_counter + 1,
            block.target_duration
        ));
        if !block.key_points.is_empty() {
            lines.push(format!("Key points to cover: {}.", block.key_points.join("; ")));
        }
        if !self.comment.trim().is_empty() {
            lines.push(format!("Moderator comment: {}", self.comment.trim()));
        }
        Some(lines.join("\n"))
    }
}

/// Evaluates the current block and writes the advanced state back.
pub struct ScenarioProgression {
    checker: ScenarioChecker,
    store: SharedSessionStore,
    window: usize,
    max_write_attempts: u32,
}

impl ScenarioProgression {
    pub fn new(model: SharedModel, store: SharedSessionStore, config: &OrchestratorConfig) -> Self {
        Self {
            checker: ScenarioChecker::new(model, config),
            store,
            window: config.transcript_window,
            max_write_attempts: config.max_write_attempts.max(1),
        }
    }

    /// Run one step over `messages` (the full transcript, oldest first).
    /// Judge failures are neutral; store failures are returned.
    pub async fn run(&self, session_id: &str, messages: &[Message]) -> StoreResult<ScenarioUpdate> {
        let loaded = self.store.load_scenario(session_id).await?;
        let Some(state) = loaded.value else {
            return Ok(ScenarioUpdate::default());
        };
        let Some(block) = state.current_block().cloned() else {
            return Ok(terminal_update(&state));
        };

        let start = messages.len().saturating_sub(self.window);
        let window = &messages[start..];
        let (block_verdict, conduct) = self.checker.check(&block, window).await;
        debug!(
            session_id,
            block = %block.title,
            is_passed = block_verdict.is_passed,
            is_need_finish = conduct.is_need_finish,
            "Scenario judged"
        );

        let mut version = loaded.version;
        let mut attempt = 0;
        let (next, transition) = loop {
            attempt += 1;
            let mut next = if attempt == 1 {
                state.clone()
            } else {
                let reloaded = self.store.load_scenario(session_id).await?;
                version = reloaded.version;
                match reloaded.value {
                    Some(s) => s,
                    None => return Ok(ScenarioUpdate::default()),
                }
            };
            let transition = next.apply(block_verdict.is_passed);

            match self
                .store
                .write_scenario(session_id, version, next.clone())
                .await
            {
                Ok(_) => break (next, transition),
                Err(e @ StoreError::Conflict { .. }) if attempt >= self.max_write_attempts => {
                    return Err(e);
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(session_id, attempt, "Scenario version moved, re-applying");
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(t) = &transition {
            info!(
                session_id,
                from = %t.from,
                to = t.to.as_deref().unwrap_or("terminal"),
                reason = %t.reason,
                "Scenario advanced"
            );
        }

        let mut update = if next.is_terminal() {
            terminal_update(&next)
        } else {
            ScenarioUpdate {
                current_block: next.current_block().cloned(),
                block_index: next.current_index,
                total_blocks: next.blocks.len(),
                turn_counter: next.turn_counter,
                ..ScenarioUpdate::default()
            }
        };
        update.transition = transition;
        update.comment = block_verdict.comment;
        update.force_finish = conduct.is_need_finish;
        update.finish_reason = conduct.reason;
        Ok(update)
    }
}

fn terminal_update(state: &ScenarioState) -> ScenarioUpdate {
    ScenarioUpdate {
        block_index: state.current_index,
        total_blocks: state.blocks.len(),
        terminal: true,
        ..ScenarioUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::prompts::{BLOCK_CHECKER_TAG, CONDUCT_CHECKER_TAG};
    use crate::store::{InMemorySessionStore, SessionRecord, SessionStore};
    use std::sync::Arc;

    async fn setup(
        model: ScriptedModel,
        scenario: Option<ScenarioState>,
    ) -> (ScenarioProgression, Arc<InMemorySessionStore>, String) {
        let store = Arc::new(InMemorySessionStore::new());
        let mut record = SessionRecord::new("interviewer");
        record.scenario = scenario;
        let sid = record.id.clone();
        store.create_session(record).await.unwrap();
        let progression =
            ScenarioProgression::new(Arc::new(model), store.clone(), &OrchestratorConfig::default());
        (progression, store, sid)
    }

    fn two_blocks() -> ScenarioState {
        ScenarioState::new(vec![
            ScenarioBlock::new("Intro", 3, vec!["background".into()]),
            ScenarioBlock::new("Rust", 3, vec!["ownership".into()]),
        ])
    }

    #[tokio::test]
    async fn test_no_scenario_is_skipped() {
        let model = Arc::new(ScriptedModel::new());
        let store = Arc::new(InMemorySessionStore::new());
        let record = SessionRecord::new("interviewer");
        let sid = record.id.clone();
        store.create_session(record).await.unwrap();
        let progression =
            ScenarioProgression::new(model.clone(), store, &OrchestratorConfig::default());

        let update = progression.run(&sid, &[]).await.unwrap();
        assert_eq!(update, ScenarioUpdate::default());
        assert_eq!(update.notes("*END*"), None);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_advance_persists() {
        let model = ScriptedModel::new()
            .respond(BLOCK_CHECKER_TAG, r#"{"is_passed": false, "comment": ""}"#)
            .respond(CONDUCT_CHECKER_TAG, r#"{"is_need_finish": false}"#);
        let (progression, store, sid) = setup(model, Some(two_blocks())).await;

        for expected in [1, 2] {
            let update = progression.run(&sid, &[]).await.unwrap();
            assert!(update.transition.is_none());
            assert_eq!(update.turn_counter, expected);
        }

        let update = progression.run(&sid, &[]).await.unwrap();
        let transition = update.transition.clone().unwrap();
        assert_eq!(transition.to.as_deref(), Some("Rust"));
        assert_eq!(update.current_block.unwrap().title, "Rust");

        let stored = store.load_scenario(&sid).await.unwrap();
        let state = stored.value.unwrap();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.turn_counter, 0);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_forced_finish_and_terminal_notes() {
        let model = ScriptedModel::new()
            .respond(BLOCK_CHECKER_TAG, r#"{"is_passed": true, "comment": "done"}"#)
            .respond(CONDUCT_CHECKER_TAG, r#"{"is_need_finish": true, "reason": "insults"}"#);
        let single = ScenarioState::new(vec![ScenarioBlock::new("Intro", 3, vec![])]);
        let (progression, _store, sid) = setup(model, Some(single)).await;

        let update = progression.run(&sid, &[]).await.unwrap();
        assert!(update.force_finish);
        assert_eq!(update.finish_reason, "insults");
        assert!(update.terminal);
        assert!(update.notes("*END*").unwrap().contains("*END*"));
    }

    #[tokio::test]
    async fn test_notes_mention_transition() {
        let model = ScriptedModel::new()
            .respond(BLOCK_CHECKER_TAG, r#"{"is_passed": true, "comment": "background covered"}"#)
            .respond(CONDUCT_CHECKER_TAG, r#"{"is_need_finish": false}"#);
        let (progression, _store, sid) = setup(model, Some(two_blocks())).await;

        let notes = progression.run(&sid, &[]).await.unwrap().notes("*END*").unwrap();
        assert!(notes.contains("\"Intro\" is finished"));
        assert!(notes.contains("ownership"));
        assert!(notes.contains("background covered"));
    }
}
