//! Similarity index abstraction.
//!
//! A per-session collection of short documents (claims, transcript
//! fragments) with string metadata. Search takes an AND of equality and
//! inequality conditions on that metadata.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemorySimilarityIndex;

/// Error type for similarity index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Index request failed: {0}")]
    Request(String),

    #[error("Index response parse error: {0}")]
    Parse(String),
}

/// Result type for similarity index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Metadata attached to an indexed document.
pub type Metadata = BTreeMap<String, String>;

/// A document to add to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata field.
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A search hit, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Similarity in `[0, 1]`; higher is closer.
    pub score: f64,
}

/// Comparison applied to a metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Eq(String),
    Ne(String),
}

/// Conjunction of metadata conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub conditions: Vec<(String, Condition)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: &str, value: impl Into<String>) -> Self {
        self.conditions
            .push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    /// Require `field != value`. Documents without the field match.
    pub fn ne(mut self, field: &str, value: impl Into<String>) -> Self {
        self.conditions
            .push((field.to_string(), Condition::Ne(value.into())));
        self
    }

    /// Check a document's metadata against every condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| match condition {
                Condition::Eq(value) => metadata.get(field) == Some(value),
                Condition::Ne(value) => metadata.get(field) != Some(value),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// External similarity index.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Create a collection. Creating an existing collection is a no-op.
    async fn create_collection(&self, collection: &str) -> IndexResult<()>;

    /// Add (or replace) a document.
    async fn add(&self, collection: &str, document: IndexDocument) -> IndexResult<()>;

    /// Return up to `top_k` documents matching `filter`, most similar first.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> IndexResult<Vec<IndexHit>>;

    /// Merge `metadata` into each listed document.
    async fn update_metadata(
        &self,
        collection: &str,
        ids: &[String],
        metadata: &Metadata,
    ) -> IndexResult<()>;
}

/// Shared reference to a similarity index
pub type SharedSimilarityIndex = Arc<dyn SimilarityIndex>;

/// Collection holding a session's claims.
pub fn facts_collection(session_id: &str) -> String {
    format!("facts-{}", session_id)
}

/// Collection holding a session's transcript fragments.
pub fn transcript_collection(session_id: &str) -> String {
    format!("transcript-{}", session_id)
}
