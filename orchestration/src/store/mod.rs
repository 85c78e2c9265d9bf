//! Session record store abstraction.
//!
//! The store owns each session's mutable record: transcript, facts blob,
//! scenario blob, finished flag and analysis result. The facts and scenario
//! blobs carry version tokens so writers can detect interleaved updates.

pub mod memory;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::facts::FactsState;
use crate::scenario::ScenarioState;
use crate::scoring::AnalysisResult;

pub use memory::{InMemorySessionStore, StoreOp};
pub use types::{ChecklistItem, ItemStatus, Message, Role, SessionId, SessionRecord};

/// Error type for session store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Version conflict on {blob}: expected {expected}, found {found}")]
    Conflict {
        blob: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A value read together with its version token.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Persistent session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, record: SessionRecord) -> StoreResult<()>;

    async fn get_session(&self, session_id: &str) -> StoreResult<SessionRecord>;

    async fn load_facts(&self, session_id: &str) -> StoreResult<Versioned<FactsState>>;

    /// Replace the facts blob if its version still equals `expected_version`.
    /// Returns the new version.
    async fn write_facts(
        &self,
        session_id: &str,
        expected_version: u64,
        facts: FactsState,
    ) -> StoreResult<u64>;

    async fn load_scenario(&self, session_id: &str)
        -> StoreResult<Versioned<Option<ScenarioState>>>;

    /// Replace the scenario blob if its version still equals
    /// `expected_version`. Returns the new version.
    async fn write_scenario(
        &self,
        session_id: &str,
        expected_version: u64,
        scenario: ScenarioState,
    ) -> StoreResult<u64>;

    async fn append_message(&self, message: Message) -> StoreResult<Message>;

    async fn delete_message(&self, session_id: &str, message_id: &str) -> StoreResult<()>;

    /// Transcript in creation order.
    async fn list_messages(&self, session_id: &str) -> StoreResult<Vec<Message>>;

    /// Set the finished flag. Returns `true` only for the call that flipped it.
    async fn mark_finished(&self, session_id: &str) -> StoreResult<bool>;

    /// Persist the analysis result and the scored checklist.
    async fn save_analysis(&self, session_id: &str, analysis: AnalysisResult) -> StoreResult<()>;
}

/// Shared reference to a session store
pub type SharedSessionStore = Arc<dyn SessionStore>;
