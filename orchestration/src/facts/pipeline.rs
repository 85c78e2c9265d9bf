//! Per-utterance fact pipeline: extract, retrieve, arbitrate, record.
//!
//! Claims of one utterance are arbitrated strictly one after another. Claims
//! that get flagged are handed to the guardian, whose sweeps run alongside
//! the remaining arbitration and are all drained before the pipeline
//! returns. Every step is fail-soft.

use futures::channel::mpsc;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::arbitrator::{ArbitrationVerdict, Arbitrator};
use super::extractor::FactExtractor;
use super::guardian::Guardian;
use super::ledger::FactLedger;
use super::retriever::NeighborRetriever;
use super::types::{Claim, ClaimOrigin};
use crate::config::OrchestratorConfig;
use crate::index::SharedSimilarityIndex;
use crate::model::SharedModel;
use crate::store::{Message, SharedSessionStore};

/// Upper bound on guardian sweeps in flight for one utterance.
const GUARDIAN_CONCURRENCY: usize = 8;

/// What one pass of the pipeline did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub extracted: usize,
    pub recorded: usize,
    pub flagged: usize,
    pub invalidated: usize,
    pub contradictions: usize,
}

pub struct FactPipeline {
    extractor: FactExtractor,
    retriever: NeighborRetriever,
    arbitrator: Arbitrator,
    guardian: Guardian,
    ledger: FactLedger,
    arbitration_neighbors: usize,
}

impl FactPipeline {
    pub fn new(
        model: SharedModel,
        index: SharedSimilarityIndex,
        store: SharedSessionStore,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            extractor: FactExtractor::new(model.clone(), config),
            retriever: NeighborRetriever::new(index.clone()),
            arbitrator: Arbitrator::new(model.clone(), config),
            guardian: Guardian::new(model, config),
            ledger: FactLedger::new(store, index, config),
            arbitration_neighbors: config.arbitration_neighbors,
        }
    }

    pub fn ledger(&self) -> &FactLedger {
        &self.ledger
    }

    /// Run the pipeline for one participant message.
    pub async fn handle_message(&self, session_id: &str, message: &Message) -> PipelineReport {
        let extracted = self.extractor.extract(&message.content).await;
        if extracted.is_empty() {
            debug!(session_id, message_id = %message.id, "No claims extracted");
            return PipelineReport::default();
        }

        let batch = uuid::Uuid::new_v4().to_string();
        let (flag_tx, flag_rx) = mpsc::unbounded::<Claim>();

        let arbitration = async move {
            let mut report = PipelineReport {
                extracted: extracted.len(),
                ..PipelineReport::default()
            };

            for item in extracted {
                let claim = Claim::new(
                    &item.text,
                    &item.topic,
                    ClaimOrigin::utterance(message.id.clone()),
                    &batch,
                );

                if let Err(e) = self.ledger.index_claim(session_id, &claim).await {
                    warn!(session_id, claim_id = %claim.id, error = %e, "Failed to index claim");
                }

                let neighbors = self
                    .retriever
                    .neighbors(session_id, &claim.text, &batch, self.arbitration_neighbors)
                    .await;
                let verdict = self.arbitrator.arbitrate(&claim.text, &neighbors).await;

                if let Err(e) = self.ledger.append_claim(session_id, claim.clone()).await {
                    warn!(session_id, claim_id = %claim.id, error = %e, "Failed to record claim");
                    continue;
                }
                report.recorded += 1;

                info!(
                    session_id,
                    claim_id = %claim.id,
                    neighbors = neighbors.len(),
                    decision = %verdict,
                    "Claim arbitrated"
                );

                match verdict {
                    ArbitrationVerdict::AddNew => {}
                    ArbitrationVerdict::FlagContradiction { .. } => {
                        report.flagged += 1;
                        if flag_tx.unbounded_send(claim).is_err() {
                            warn!(session_id, "Guardian queue closed");
                        }
                    }
                    ArbitrationVerdict::InvalidateOld { target_id } => {
                        match self.ledger.invalidate(session_id, &target_id, &claim.id).await {
                            Ok(true) => report.invalidated += 1,
                            Ok(false) => {
                                debug!(session_id, target_id = %target_id, "Invalidation target unknown or already invalidated");
                            }
                            Err(e) => {
                                warn!(session_id, target_id = %target_id, error = %e, "Failed to invalidate claim");
                            }
                        }
                    }
                }
            }

            // Closing the queue lets the guardian drain finish.
            drop(flag_tx);
            report
        };

        let sweeps = flag_rx
            .map(|claim| self.sweep(session_id, claim))
            .buffer_unordered(GUARDIAN_CONCURRENCY)
            .collect::<Vec<usize>>();

        let (mut report, found) = tokio::join!(arbitration, sweeps);
        report.contradictions = found.into_iter().sum();
        report
    }

    async fn sweep(&self, session_id: &str, claim: Claim) -> usize {
        let facts = match self.ledger.snapshot(session_id).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(session_id, error = %e, "Could not load facts for guardian attribution");
                Default::default()
            }
        };

        let records = self
            .guardian
            .sweep(session_id, &claim, &self.retriever, &facts)
            .await;
        let count = records.len();
        if let Err(e) = self.ledger.append_contradictions(session_id, records).await {
            warn!(session_id, claim_id = %claim.id, error = %e, "Failed to record contradictions");
            return 0;
        }
        count
    }
}
