//! Scenario progression through ordered topic blocks.
//!
//! Each participant turn is judged against the current block. The block
//! advances when the judge says it is covered or when it has run long
//! enough; advancing past the last block leaves the scenario terminal.

pub mod checker;
pub mod progression;
pub mod state;

pub use checker::{BlockVerdict, ConductVerdict, ScenarioChecker};
pub use progression::{ScenarioProgression, ScenarioUpdate};
pub use state::{AdvanceReason, ScenarioBlock, ScenarioState, ScenarioTransition};
