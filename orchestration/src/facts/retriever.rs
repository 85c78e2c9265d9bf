//! Nearest-neighbor lookup over a session's claims.

use tracing::warn;

use crate::index::{facts_collection, MetadataFilter, SharedSimilarityIndex};

/// Metadata keys written for every indexed claim.
pub mod meta {
    pub const CLAIM_ID: &str = "claim_id";
    pub const STATUS: &str = "status";
    pub const BATCH: &str = "ingestion_batch";
    pub const TOPIC: &str = "topic";
    pub const SOURCE: &str = "source";
    pub const INVALIDATED_BY: &str = "invalidated_by";
}

/// A retrieved claim, in similarity order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
}

/// Retrieves similar active claims from earlier batches.
pub struct NeighborRetriever {
    index: SharedSimilarityIndex,
}

impl NeighborRetriever {
    pub fn new(index: SharedSimilarityIndex) -> Self {
        Self { index }
    }

    /// Up to `k` active claims similar to `text` that were not ingested in
    /// `current_batch`. Index failures yield an empty list.
    pub async fn neighbors(
        &self,
        session_id: &str,
        text: &str,
        current_batch: &str,
        k: usize,
    ) -> Vec<Neighbor> {
        let filter = MetadataFilter::new()
            .eq(meta::STATUS, "active")
            .ne(meta::BATCH, current_batch);
        self.search(session_id, text, k, &filter).await
    }

    /// Up to `k` active claims similar to `text`, excluding `claim_id`.
    pub async fn others(
        &self,
        session_id: &str,
        text: &str,
        claim_id: &str,
        k: usize,
    ) -> Vec<Neighbor> {
        let filter = MetadataFilter::new()
            .eq(meta::STATUS, "active")
            .ne(meta::CLAIM_ID, claim_id);
        self.search(session_id, text, k, &filter).await
    }

    async fn search(
        &self,
        session_id: &str,
        text: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        match self
            .index
            .search(&facts_collection(session_id), text, k, filter)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .take(k)
                .map(|hit| Neighbor {
                    id: hit.metadata.get(meta::CLAIM_ID).cloned().unwrap_or(hit.id),
                    text: hit.text,
                })
                .collect(),
            Err(e) => {
                warn!(session_id, error = %e, "Neighbor retrieval failed, continuing without neighbors");
                Vec::new()
            }
        }
    }
}
