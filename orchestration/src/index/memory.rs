//! In-process similarity index using bag-of-words cosine similarity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    IndexDocument, IndexError, IndexHit, IndexResult, Metadata, MetadataFilter, SimilarityIndex,
};

/// Similarity index held in memory. Suitable for single-process runs and
/// tests; results are deterministic (ties keep insertion order).
#[derive(Debug, Default)]
pub struct InMemorySimilarityIndex {
    collections: RwLock<HashMap<String, Vec<IndexDocument>>>,
    unavailable: AtomicBool,
}

impl InMemorySimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail, simulating an unreachable index.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, collection: &str) -> Vec<IndexDocument> {
        self.collections
            .read()
            .map(|c| c.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check_available(&self) -> IndexResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexError::Request("index unavailable".to_string()));
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(token, x)| b.get(token).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl SimilarityIndex for InMemorySimilarityIndex {
    async fn create_collection(&self, collection: &str) -> IndexResult<()> {
        self.check_available()?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| IndexError::Request("lock poisoned".to_string()))?;
        collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn add(&self, collection: &str, document: IndexDocument) -> IndexResult<()> {
        self.check_available()?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| IndexError::Request("lock poisoned".to_string()))?;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> IndexResult<Vec<IndexHit>> {
        self.check_available()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| IndexError::Request("lock poisoned".to_string()))?;
        let docs = collections
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        let query_vec = tokenize(query);
        let mut hits: Vec<IndexHit> = docs
            .iter()
            .filter(|d| filter.matches(&d.metadata))
            .map(|d| IndexHit {
                id: d.id.clone(),
                text: d.text.clone(),
                metadata: d.metadata.clone(),
                score: cosine(&query_vec, &tokenize(&d.text)),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn update_metadata(
        &self,
        collection: &str,
        ids: &[String],
        metadata: &Metadata,
    ) -> IndexResult<()> {
        self.check_available()?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| IndexError::Request("lock poisoned".to_string()))?;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        for doc in docs.iter_mut().filter(|d| ids.contains(&d.id)) {
            for (key, value) in metadata {
                doc.metadata.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}
