//! In-process session store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{Message, SessionRecord};
use super::{SessionStore, StoreError, StoreResult, Versioned};
use crate::facts::FactsState;
use crate::scenario::ScenarioState;
use crate::scoring::AnalysisResult;

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    AppendMessage,
    DeleteMessage,
    ListMessages,
    LoadFacts,
    WriteFacts,
    LoadScenario,
    WriteScenario,
    SaveAnalysis,
}

/// Session store held in memory, with per-operation fault injection.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    failing: Mutex<HashSet<StoreOp>>,
    forced_conflicts: AtomicU32,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with a backend error until cleared.
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// Make the next `count` facts writes fail with a version conflict, as if
    /// another writer got in first.
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if failing.contains(&op) {
            return Err(StoreError::Backend(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }

    fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionRecord) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        f(record)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, record: SessionRecord) -> StoreResult<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if sessions.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        sessions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StoreResult<SessionRecord> {
        self.with_session(session_id, |record| Ok(record.clone()))
    }

    async fn load_facts(&self, session_id: &str) -> StoreResult<Versioned<FactsState>> {
        self.check(StoreOp::LoadFacts)?;
        self.with_session(session_id, |record| {
            Ok(Versioned {
                value: record.facts.clone(),
                version: record.facts_version,
            })
        })
    }

    async fn write_facts(
        &self,
        session_id: &str,
        expected_version: u64,
        facts: FactsState,
    ) -> StoreResult<u64> {
        self.check(StoreOp::WriteFacts)?;
        let forced = self.take_forced_conflict();
        self.with_session(session_id, |record| {
            if forced {
                record.facts_version += 1;
            }
            if record.facts_version != expected_version {
                return Err(StoreError::Conflict {
                    blob: "facts",
                    expected: expected_version,
                    found: record.facts_version,
                });
            }
            record.facts = facts;
            record.facts_version += 1;
            Ok(record.facts_version)
        })
    }

    async fn load_scenario(
        &self,
        session_id: &str,
    ) -> StoreResult<Versioned<Option<ScenarioState>>> {
        self.check(StoreOp::LoadScenario)?;
        self.with_session(session_id, |record| {
            Ok(Versioned {
                value: record.scenario.clone(),
                version: record.scenario_version,
            })
        })
    }

    async fn write_scenario(
        &self,
        session_id: &str,
        expected_version: u64,
        scenario: ScenarioState,
    ) -> StoreResult<u64> {
        self.check(StoreOp::WriteScenario)?;
        self.with_session(session_id, |record| {
            if record.scenario_version != expected_version {
                return Err(StoreError::Conflict {
                    blob: "scenario",
                    expected: expected_version,
                    found: record.scenario_version,
                });
            }
            record.scenario = Some(scenario);
            record.scenario_version += 1;
            Ok(record.scenario_version)
        })
    }

    async fn append_message(&self, message: Message) -> StoreResult<Message> {
        self.check(StoreOp::AppendMessage)?;
        self.with_session(&message.session_id.clone(), |record| {
            record.messages.push(message.clone());
            Ok(message)
        })
    }

    async fn delete_message(&self, session_id: &str, message_id: &str) -> StoreResult<()> {
        self.check(StoreOp::DeleteMessage)?;
        self.with_session(session_id, |record| {
            let before = record.messages.len();
            record.messages.retain(|m| m.id != message_id);
            if record.messages.len() == before {
                return Err(StoreError::MessageNotFound(message_id.to_string()));
            }
            Ok(())
        })
    }

    async fn list_messages(&self, session_id: &str) -> StoreResult<Vec<Message>> {
        self.check(StoreOp::ListMessages)?;
        self.with_session(session_id, |record| Ok(record.messages.clone()))
    }

    async fn mark_finished(&self, session_id: &str) -> StoreResult<bool> {
        self.with_session(session_id, |record| {
            if record.is_finished {
                return Ok(false);
            }
            record.is_finished = true;
            Ok(true)
        })
    }

    async fn save_analysis(&self, session_id: &str, analysis: AnalysisResult) -> StoreResult<()> {
        self.check(StoreOp::SaveAnalysis)?;
        self.with_session(session_id, |record| {
            if !analysis.items.is_empty() {
                record.checklist = analysis.items.clone();
            }
            record.analysis = Some(analysis);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;

    async fn store_with_session() -> (InMemorySessionStore, String) {
        let store = InMemorySessionStore::new();
        let record = SessionRecord::new("You are an interviewer.");
        let id = record.id.clone();
        store.create_session(record).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_facts_version_conflict() {
        let (store, id) = store_with_session().await;
        let read = store.load_facts(&id).await.unwrap();
        assert_eq!(read.version, 0);

        let v1 = store
            .write_facts(&id, read.version, FactsState::default())
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let err = store
            .write_facts(&id, read.version, FactsState::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_mark_finished_flips_once() {
        let (store, id) = store_with_session().await;
        assert!(store.mark_finished(&id).await.unwrap());
        assert!(!store.mark_finished(&id).await.unwrap());
        assert!(store.get_session(&id).await.unwrap().is_finished);
    }

    #[tokio::test]
    async fn test_message_append_and_delete() {
        let (store, id) = store_with_session().await;
        let msg = store
            .append_message(Message::new(&id, Role::User, "hello"))
            .await
            .unwrap();
        assert_eq!(store.list_messages(&id).await.unwrap().len(), 1);

        store.delete_message(&id, &msg.id).await.unwrap();
        assert!(store.list_messages(&id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_message(&id, &msg.id).await.unwrap_err(),
            StoreError::MessageNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (store, id) = store_with_session().await;
        store.fail_on(StoreOp::ListMessages);
        assert!(store.list_messages(&id).await.is_err());
        store.clear_failures();
        assert!(store.list_messages(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.get_session("missing").await.unwrap_err(),
            StoreError::SessionNotFound(_)
        ));
    }
}
