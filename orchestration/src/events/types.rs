//! Session event types pushed to subscribers.

use serde::{Deserialize, Serialize};

use crate::scoring::AnalysisResult;
use crate::store::{ItemStatus, Message};

/// Events published on a session's channel. Serialized as
/// `{"type": "...", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// A message was persisted.
    #[serde(rename = "message.created")]
    MessageCreated(Message),

    /// A message was removed; payload is its id.
    #[serde(rename = "message.deleted")]
    MessageDeleted(String),

    /// Post-session scoring began.
    #[serde(rename = "analysis.started")]
    AnalysisStarted { session_id: String },

    /// One checklist item was scored (or failed).
    #[serde(rename = "analysis.progress")]
    AnalysisProgress {
        session_id: String,
        item_id: String,
        status: ItemStatus,
        score: Option<f64>,
        completed: usize,
        total: usize,
    },

    #[serde(rename = "analysis.completed")]
    AnalysisCompleted(AnalysisResult),

    #[serde(rename = "analysis.error")]
    AnalysisError { session_id: String, message: String },
}

impl SessionEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "message.created",
            Self::MessageDeleted(_) => "message.deleted",
            Self::AnalysisStarted { .. } => "analysis.started",
            Self::AnalysisProgress { .. } => "analysis.progress",
            Self::AnalysisCompleted(_) => "analysis.completed",
            Self::AnalysisError { .. } => "analysis.error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;

    #[test]
    fn test_wire_shape() {
        let event = SessionEvent::MessageDeleted("m-1".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message.deleted");
        assert_eq!(json["payload"], "m-1");

        let event = SessionEvent::AnalysisStarted {
            session_id: "s-1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "analysis.started");
        assert_eq!(json["payload"]["session_id"], "s-1");
    }

    #[test]
    fn test_message_created_roundtrip() {
        let event = SessionEvent::MessageCreated(Message::new("s-1", Role::Assistant, "hi"));
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "message.created");
    }
}
