//! Session record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::facts::FactsState;
use crate::scenario::ScenarioState;
use crate::scoring::AnalysisResult;

/// Session identifier
pub type SessionId = String;

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    /// Context folded into composition of this reply; never shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: &str, role: Role, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            hidden_notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_hidden_notes(mut self, notes: Option<String>) -> Self {
        self.hidden_notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Evaluation status of a checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Unconfirmed,
    Evaluated,
    Failed,
}

/// One requirement the interview is scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub description: String,
    /// Scoring category, e.g. `technical_skill` or `soft_skill`.
    pub category: String,
    /// Relative weight inside the category, 0..=10.
    pub weight: f64,
    /// Judge score 0..=10; unset until evaluated.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub justification: String,
    #[serde(default = "default_item_status")]
    pub status: ItemStatus,
}

fn default_item_status() -> ItemStatus {
    ItemStatus::Unconfirmed
}

impl ChecklistItem {
    pub fn new(id: &str, description: &str, category: &str, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            weight,
            score: None,
            justification: String::new(),
            status: ItemStatus::Unconfirmed,
        }
    }
}

/// The mutable record of one interview session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: Option<String>,
    /// Interviewer instructions used for every composed reply.
    pub system_prompt: String,
    pub checklist: Vec<ChecklistItem>,
    pub scenario: Option<ScenarioState>,
    pub scenario_version: u64,
    pub facts: FactsState,
    pub facts_version: u64,
    pub is_finished: bool,
    pub analysis: Option<AnalysisResult>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            system_prompt: system_prompt.to_string(),
            checklist: Vec::new(),
            scenario: None,
            scenario_version: 0,
            facts: FactsState::default(),
            facts_version: 0,
            is_finished: false,
            analysis: None,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
