//! Claim ledger data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Invalidated,
    Clarified,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invalidated => "invalidated",
            Self::Clarified => "clarified",
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a claim came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimOrigin {
    /// Extracted from a participant message.
    Utterance { message_id: String },
    /// Ingested from the participant's prior document.
    Resume,
}

impl ClaimOrigin {
    pub fn utterance(message_id: impl Into<String>) -> Self {
        Self::Utterance {
            message_id: message_id.into(),
        }
    }

    /// Short label stored as index metadata.
    pub fn source_label(&self) -> &'static str {
        match self {
            Self::Utterance { .. } => "chat",
            Self::Resume => "resume",
        }
    }
}

impl std::fmt::Display for ClaimOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utterance { message_id } => write!(f, "utterance:{}", message_id),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// A normalized factual statement attributed to the participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub text: String,
    pub topic: String,
    pub origin: ClaimOrigin,
    pub status: ClaimStatus,
    /// Set iff `status == Invalidated`.
    pub invalidated_by: Option<String>,
    /// Claims extracted from the same utterance share a batch.
    pub ingestion_batch: String,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// A new active claim with a fresh id.
    pub fn new(text: &str, topic: &str, origin: ClaimOrigin, batch: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            topic: topic.to_string(),
            origin,
            status: ClaimStatus::Active,
            invalidated_by: None,
            ingestion_batch: batch.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ClaimStatus::Active
    }
}

/// A claim named by the guardian as conflicting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingClaim {
    pub text: String,
    /// Origin when the text could be matched to a ledger claim.
    pub origin: Option<ClaimOrigin>,
}

/// A detected contradiction awaiting (or after) delivery in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub id: String,
    pub explanation: String,
    pub conflicting: Vec<ConflictingClaim>,
    /// Flips false → true once, after a reply carrying it was persisted.
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl ContradictionRecord {
    pub fn new(explanation: &str, conflicting: Vec<ConflictingClaim>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            explanation: explanation.to_string(),
            conflicting,
            delivered: false,
            created_at: Utc::now(),
        }
    }
}

/// The per-session facts blob: claim ledger plus contradictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactsState {
    pub ledger: Vec<Claim>,
    pub contradictions: Vec<ContradictionRecord>,
}

impl FactsState {
    pub fn claim(&self, id: &str) -> Option<&Claim> {
        self.ledger.iter().find(|c| c.id == id)
    }

    pub fn active_claims(&self) -> impl Iterator<Item = &Claim> {
        self.ledger.iter().filter(|c| c.is_active())
    }

    /// Append a claim. Returns `false` (and leaves the ledger untouched) when
    /// the id is already present.
    pub fn append_claim(&mut self, claim: Claim) -> bool {
        if self.claim(&claim.id).is_some() {
            return false;
        }
        self.ledger.push(claim);
        true
    }

    /// Invalidate `target` in favor of `by`. Returns `false` when the target
    /// is unknown or already invalidated.
    pub fn invalidate(&mut self, target: &str, by: &str) -> bool {
        match self.ledger.iter_mut().find(|c| c.id == target) {
            Some(claim) if claim.status != ClaimStatus::Invalidated => {
                claim.status = ClaimStatus::Invalidated;
                claim.invalidated_by = Some(by.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn append_contradictions(&mut self, records: impl IntoIterator<Item = ContradictionRecord>) {
        for record in records {
            if !self.contradictions.iter().any(|c| c.id == record.id) {
                self.contradictions.push(record);
            }
        }
    }

    /// Contradictions not yet delivered, oldest first.
    pub fn pending_contradictions(&self) -> Vec<ContradictionRecord> {
        self.contradictions
            .iter()
            .filter(|c| !c.delivered)
            .cloned()
            .collect()
    }

    /// Mark the listed contradictions delivered. Returns how many flipped.
    pub fn mark_delivered(&mut self, ids: &[String]) -> usize {
        let mut flipped = 0;
        for record in self
            .contradictions
            .iter_mut()
            .filter(|c| !c.delivered && ids.contains(&c.id))
        {
            record.delivered = true;
            flipped += 1;
        }
        flipped
    }

    /// Origin of the first ledger claim whose text matches, ignoring case
    /// and surrounding whitespace.
    pub fn origin_for_text(&self, text: &str) -> Option<ClaimOrigin> {
        let needle = text.trim().to_lowercase();
        self.ledger
            .iter()
            .find(|c| c.text.trim().to_lowercase() == needle)
            .map(|c| c.origin.clone())
    }
}

/// A claim as produced by the extractor, before it enters the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedClaim {
    pub text: String,
    pub topic: String,
}

/// A claim taken from a prior document, e.g. a parsed resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentClaim {
    pub text: String,
    #[serde(default)]
    pub topic: Option<String>,
}
