//! Persistent claim ledger.
//!
//! Every mutation re-reads the latest facts blob, applies the change and
//! writes it back under the version token it read. A conflicting write is
//! retried from a fresh read up to the configured attempt count.

use tracing::{debug, info, warn};

use super::extractor::{collapse_whitespace, normalize_topic};
use super::retriever::meta;
use super::types::{Claim, ClaimOrigin, ContradictionRecord, DocumentClaim, FactsState};
use crate::config::OrchestratorConfig;
use crate::index::{facts_collection, IndexDocument, IndexResult, Metadata, SharedSimilarityIndex};
use crate::store::{SharedSessionStore, StoreError, StoreResult};

/// Claim ledger backed by the session store and mirrored into the
/// similarity index.
pub struct FactLedger {
    store: SharedSessionStore,
    index: SharedSimilarityIndex,
    max_write_attempts: u32,
}

impl FactLedger {
    pub fn new(
        store: SharedSessionStore,
        index: SharedSimilarityIndex,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            index,
            max_write_attempts: config.max_write_attempts.max(1),
        }
    }

    /// Latest persisted facts blob.
    pub async fn snapshot(&self, session_id: &str) -> StoreResult<FactsState> {
        Ok(self.store.load_facts(session_id).await?.value)
    }

    /// Read-merge-write `apply` against the latest facts blob.
    ///
    /// `apply` may run more than once when a concurrent writer moves the
    /// version; it must be safe to re-apply to a fresh read.
    pub async fn mutate<T>(
        &self,
        session_id: &str,
        mut apply: impl FnMut(&mut FactsState) -> T,
    ) -> StoreResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.store.load_facts(session_id).await?;
            let mut facts = current.value;
            let out = apply(&mut facts);

            match self
                .store
                .write_facts(session_id, current.version, facts)
                .await
            {
                Ok(version) => {
                    debug!(session_id, version, attempt, "Facts written");
                    return Ok(out);
                }
                Err(e @ StoreError::Conflict { .. }) if attempt >= self.max_write_attempts => {
                    warn!(session_id, attempt, "Facts write still conflicting, giving up");
                    return Err(e);
                }
                Err(StoreError::Conflict { found, .. }) => {
                    debug!(session_id, attempt, found, "Facts version moved, re-merging");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Add a claim to the session's index collection.
    pub async fn index_claim(&self, session_id: &str, claim: &Claim) -> IndexResult<()> {
        self.index
            .add(&facts_collection(session_id), claim_document(claim))
            .await
    }

    pub async fn append_claim(&self, session_id: &str, claim: Claim) -> StoreResult<()> {
        let claim_id = claim.id.clone();
        let appended = self
            .mutate(session_id, |facts| facts.append_claim(claim.clone()))
            .await?;
        if !appended {
            debug!(session_id, claim_id = %claim_id, "Claim already in ledger");
        }
        Ok(())
    }

    /// Invalidate `target` in favor of `by` and mirror the status into the
    /// index. Returns whether the ledger changed. Index propagation failure
    /// is logged, not returned.
    pub async fn invalidate(&self, session_id: &str, target: &str, by: &str) -> StoreResult<bool> {
        let changed = self
            .mutate(session_id, |facts| facts.invalidate(target, by))
            .await?;

        if changed {
            let mut metadata = Metadata::new();
            metadata.insert(meta::STATUS.to_string(), "invalidated".to_string());
            metadata.insert(meta::INVALIDATED_BY.to_string(), by.to_string());
            if let Err(e) = self
                .index
                .update_metadata(&facts_collection(session_id), &[target.to_string()], &metadata)
                .await
            {
                warn!(session_id, claim_id = target, error = %e, "Failed to propagate invalidation to index");
            }
            info!(session_id, claim_id = target, invalidated_by = by, "Claim invalidated");
        }
        Ok(changed)
    }

    pub async fn append_contradictions(
        &self,
        session_id: &str,
        records: Vec<ContradictionRecord>,
    ) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        self.mutate(session_id, |facts| {
            facts.append_contradictions(records.iter().cloned())
        })
        .await?;
        info!(session_id, count, "Contradictions recorded");
        Ok(())
    }

    pub async fn pending_contradictions(
        &self,
        session_id: &str,
    ) -> StoreResult<Vec<ContradictionRecord>> {
        Ok(self.snapshot(session_id).await?.pending_contradictions())
    }

    /// Mark exactly `ids` delivered. Returns how many flipped.
    pub async fn mark_delivered(&self, session_id: &str, ids: &[String]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let flipped = self
            .mutate(session_id, |facts| facts.mark_delivered(ids))
            .await?;
        debug!(session_id, flipped, "Contradictions marked delivered");
        Ok(flipped)
    }

    /// Ingest claims from a prior document. They enter the ledger active,
    /// under one fresh batch, without arbitration.
    pub async fn ingest_document_claims(
        &self,
        session_id: &str,
        claims: Vec<DocumentClaim>,
    ) -> StoreResult<usize> {
        let batch = uuid::Uuid::new_v4().to_string();
        let claims: Vec<Claim> = claims
            .into_iter()
            .filter_map(|c| {
                let text = collapse_whitespace(&c.text);
                if text.is_empty() {
                    return None;
                }
                let topic = normalize_topic(c.topic.as_deref());
                Some(Claim::new(&text, &topic, ClaimOrigin::Resume, &batch))
            })
            .collect();
        if claims.is_empty() {
            return Ok(0);
        }

        for claim in &claims {
            if let Err(e) = self.index_claim(session_id, claim).await {
                warn!(session_id, claim_id = %claim.id, error = %e, "Failed to index document claim");
            }
        }

        let count = self
            .mutate(session_id, |facts| {
                claims
                    .iter()
                    .filter(|c| facts.append_claim((*c).clone()))
                    .count()
            })
            .await?;
        info!(session_id, count, "Document claims ingested");
        Ok(count)
    }
}

/// Index representation of a claim.
pub fn claim_document(claim: &Claim) -> IndexDocument {
    IndexDocument::new(claim.id.clone(), claim.text.clone())
        .with_meta(meta::CLAIM_ID, claim.id.clone())
        .with_meta(meta::STATUS, claim.status.as_str())
        .with_meta(meta::BATCH, claim.ingestion_batch.clone())
        .with_meta(meta::TOPIC, claim.topic.clone())
        .with_meta(meta::SOURCE, claim.origin.source_label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::types::ClaimStatus;
    use crate::index::{InMemorySimilarityIndex, SimilarityIndex};
    use crate::store::{InMemorySessionStore, SessionRecord, SessionStore};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemorySessionStore>,
        index: Arc<InMemorySimilarityIndex>,
        ledger: FactLedger,
        session_id: String,
    }

    async fn fixture(config: OrchestratorConfig) -> Fixture {
        let store = Arc::new(InMemorySessionStore::new());
        let index = Arc::new(InMemorySimilarityIndex::new());
        let record = SessionRecord::new("interviewer");
        let session_id = record.id.clone();
        store.create_session(record).await.unwrap();
        index
            .create_collection(&facts_collection(&session_id))
            .await
            .unwrap();
        let ledger = FactLedger::new(store.clone(), index.clone(), &config);
        Fixture {
            store,
            index,
            ledger,
            session_id,
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried_from_fresh_read() {
        let fx = fixture(OrchestratorConfig::default()).await;
        fx.store.force_conflicts(2);

        let claim = Claim::new("knows Go", "skill", ClaimOrigin::utterance("m1"), "b1");
        fx.ledger.append_claim(&fx.session_id, claim.clone()).await.unwrap();

        let facts = fx.ledger.snapshot(&fx.session_id).await.unwrap();
        assert_eq!(facts.ledger.len(), 1);
        assert_eq!(facts.ledger[0].id, claim.id);
    }

    #[tokio::test]
    async fn test_conflict_gives_up_after_max_attempts() {
        let config = OrchestratorConfig {
            max_write_attempts: 2,
            ..OrchestratorConfig::default()
        };
        let fx = fixture(config).await;
        fx.store.force_conflicts(2);

        let claim = Claim::new("knows Go", "skill", ClaimOrigin::utterance("m1"), "b1");
        let err = fx
            .ledger
            .append_claim(&fx.session_id, claim)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_invalidate_propagates_to_index() {
        let fx = fixture(OrchestratorConfig::default()).await;
        let old = Claim::new("works at Acme", "experience", ClaimOrigin::utterance("m1"), "b1");
        let new = Claim::new("left Acme", "experience", ClaimOrigin::utterance("m2"), "b2");
        for claim in [&old, &new] {
            fx.ledger.index_claim(&fx.session_id, claim).await.unwrap();
            fx.ledger
                .append_claim(&fx.session_id, claim.clone())
                .await
                .unwrap();
        }

        assert!(fx
            .ledger
            .invalidate(&fx.session_id, &old.id, &new.id)
            .await
            .unwrap());

        let facts = fx.ledger.snapshot(&fx.session_id).await.unwrap();
        assert_eq!(facts.ledger.len(), 2);
        assert_eq!(facts.claim(&old.id).unwrap().status, ClaimStatus::Invalidated);

        let docs = fx.index.documents(&facts_collection(&fx.session_id));
        let doc = docs.iter().find(|d| d.id == old.id).unwrap();
        assert_eq!(doc.metadata.get(meta::STATUS).map(String::as_str), Some("invalidated"));
        assert_eq!(doc.metadata.get(meta::INVALIDATED_BY), Some(&new.id));
    }

    #[tokio::test]
    async fn test_ingest_document_claims() {
        let fx = fixture(OrchestratorConfig::default()).await;
        let count = fx
            .ledger
            .ingest_document_claims(
                &fx.session_id,
                vec![
                    DocumentClaim {
                        text: "5 years  of Vue".into(),
                        topic: Some("Experience".into()),
                    },
                    DocumentClaim {
                        text: "  ".into(),
                        topic: None,
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(count, 1);

        let facts = fx.ledger.snapshot(&fx.session_id).await.unwrap();
        assert_eq!(facts.ledger[0].text, "5 years of Vue");
        assert_eq!(facts.ledger[0].origin, ClaimOrigin::Resume);

        let docs = fx.index.documents(&facts_collection(&fx.session_id));
        assert_eq!(docs[0].metadata.get(meta::SOURCE).map(String::as_str), Some("resume"));
    }

    #[tokio::test]
    async fn test_mark_delivered_only_listed() {
        let fx = fixture(OrchestratorConfig::default()).await;
        let a = ContradictionRecord::new("a", vec![]);
        let b = ContradictionRecord::new("b", vec![]);
        fx.ledger
            .append_contradictions(&fx.session_id, vec![a.clone(), b.clone()])
            .await
            .unwrap();

        let flipped = fx
            .ledger
            .mark_delivered(&fx.session_id, &[a.id.clone()])
            .await
            .unwrap();
        assert_eq!(flipped, 1);

        let pending = fx.ledger.pending_contradictions(&fx.session_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }
}
