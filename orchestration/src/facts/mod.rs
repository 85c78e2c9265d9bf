//! Claim ledger, pairwise arbitration and the contradiction guardian.
//!
//! Claims extracted from each participant utterance are compared against
//! similar active claims from earlier utterances (or the prior document).
//! The pairwise verdict decides whether the new claim is simply added,
//! supersedes an older one, or is flagged for a broader guardian sweep that
//! records contradictions for delivery in a later reply.

pub mod arbitrator;
pub mod extractor;
pub mod guardian;
pub mod ledger;
pub mod pipeline;
pub mod retriever;
pub mod types;

pub use arbitrator::{aggregate, parse_verdict, ArbitrationVerdict, Arbitrator};
pub use extractor::FactExtractor;
pub use guardian::Guardian;
pub use ledger::FactLedger;
pub use pipeline::{FactPipeline, PipelineReport};
pub use retriever::{Neighbor, NeighborRetriever};
pub use types::{
    Claim, ClaimOrigin, ClaimStatus, ConflictingClaim, ContradictionRecord, DocumentClaim,
    ExtractedClaim, FactsState,
};
