//! Interview Session Orchestration Library
//!
//! This library provides:
//! - A per-session claim ledger with pairwise arbitration and a broader
//!   contradiction guardian
//! - At-least-once delivery of detected contradictions into replies
//! - A scenario state machine that paces the interview through topic blocks
//! - The per-turn session orchestrator that composes all of the above
//! - Per-session event broadcasting and post-session checklist scoring
//!
//! # Turn Flow
//!
//! ```text
//! user message ──▶ persist + message.created
//!                    │
//!        ┌───────────┴────────────┐
//!        ▼                        ▼
//!  quality analysis        fact pipeline
//!  (prior reply only)      extract → retrieve → arbitrate → ledger
//!        │                        │            └─ flag → guardian
//!        └───────────┬────────────┘
//!                    ▼
//!           scenario progression ── is_need_finish ──▶ finish path
//!                    ▼
//!           compose reply (contradictions + quality + scenario notes)
//!                    ▼
//!           persist + message.created, mark contradictions delivered
//!                    ▼
//!           end marker? ──▶ finish session ──▶ post-session scoring
//! ```
//!
//! External collaborators (model, similarity index, session store) are
//! consumed through the traits in [`model`], [`index`] and [`store`].

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod events;
pub mod facts;
pub mod index;
pub mod model;
pub mod prompts;
pub mod scenario;
pub mod scoring;
pub mod session;
pub mod store;

pub use config::{CategoryWeighting, ConfigError, OrchestratorConfig};

pub use events::{
    EventBroadcaster, SessionEvent, SharedEventBroadcaster, SubscriberId, Subscription,
};

pub use facts::{
    Arbitrator, ArbitrationVerdict, Claim, ClaimOrigin, ClaimStatus, ConflictingClaim,
    ContradictionRecord, DocumentClaim, ExtractedClaim, FactExtractor, FactLedger,
    FactPipeline, FactsState, Guardian, NeighborRetriever,
};

pub use index::{
    Condition, IndexDocument, IndexError, IndexHit, InMemorySimilarityIndex, MetadataFilter,
    SharedSimilarityIndex, SimilarityIndex,
};

pub use model::{ModelError, ModelService, ScriptedModel, SharedModel};

pub use scenario::{
    BlockVerdict, ScenarioBlock, ScenarioChecker, ScenarioProgression, ScenarioState,
    ScenarioTransition, ScenarioUpdate,
};

pub use scoring::{AnalysisResult, PostSessionScorer};

pub use session::{
    FinishOutcome, NewSession, SessionError, SessionOrchestrator, TurnOutcome,
};

pub use store::{
    ChecklistItem, InMemorySessionStore, Message, Role, SessionRecord, SessionStore,
    SharedSessionStore, StoreError,
};
