//! Per-turn session orchestration.

pub mod composer;
pub mod locks;
pub mod orchestrator;
pub mod quality;

pub use composer::ReplyComposer;
pub use locks::TurnLocks;
pub use orchestrator::{
    FinishOutcome, NewSession, SessionError, SessionOrchestrator, SessionResult,
    SharedSessionOrchestrator, TurnOutcome,
};
pub use quality::{QualityAnalyzer, QualityAssessment};
