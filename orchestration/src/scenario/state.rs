//! Scenario state machine: ordered topic blocks with per-block pacing.

use serde::{Deserialize, Serialize};

use crate::store::ChecklistItem;

/// Timeout floor used for blocks whose target duration is 0 or 1 turn.
pub const MIN_TIMEOUT_TURNS: u32 = 3;

/// One topic block of an interview scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBlock {
    pub title: String,
    /// Intended length of the block, in turns.
    pub target_duration: u32,
    pub key_points: Vec<String>,
    pub position: usize,
}

impl ScenarioBlock {
    pub fn new(title: &str, target_duration: u32, key_points: Vec<String>) -> Self {
        Self {
            title: title.to_string(),
            target_duration,
            key_points,
            position: 0,
        }
    }
}

/// Why the scenario left a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    /// The block-completion judge considered the block covered.
    Passed,
    /// The block ran out of turns.
    Timeout,
}

impl std::fmt::Display for AdvanceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A block transition. `to` is `None` when the scenario became terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioTransition {
    pub from: String,
    pub to: Option<String>,
    /// Key points of the block being entered.
    pub key_points: Vec<String>,
    pub reason: AdvanceReason,
}

/// Progress through the scenario. Terminal iff `current_index == blocks.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub blocks: Vec<ScenarioBlock>,
    pub current_index: usize,
    pub turn_counter: u32,
}

impl ScenarioState {
    /// Start at the first block. Positions are renumbered in list order.
    pub fn new(blocks: Vec<ScenarioBlock>) -> Self {
        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(position, block)| ScenarioBlock { position, ..block })
            .collect();
        Self {
            blocks,
            current_index: 0,
            turn_counter: 0,
        }
    }

    /// One block per checklist category, in order of first appearance. Key
    /// points are the category's item descriptions.
    pub fn from_checklist(items: &[ChecklistItem], target_duration: u32) -> Self {
        let mut blocks: Vec<ScenarioBlock> = Vec::new();
        for item in items {
            match blocks.iter_mut().find(|b| b.title == item.category) {
                Some(block) => block.key_points.push(item.description.clone()),
                None => blocks.push(ScenarioBlock::new(
                    &item.category,
                    target_duration,
                    vec![item.description.clone()],
                )),
            }
        }
        Self::new(blocks)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_index >= self.blocks.len()
    }

    pub fn current_block(&self) -> Option<&ScenarioBlock> {
        self.blocks.get(self.current_index)
    }

    /// Turn count at which a block of `target` turns is advanced regardless
    /// of the judge.
    pub fn timeout_threshold(target: u32) -> u32 {
        if target > 1 {
            target - 1
        } else {
            MIN_TIMEOUT_TURNS
        }
    }

    /// Apply one turn's evaluation. Returns the transition when the block
    /// advanced; otherwise the turn counter grows. No-op when terminal.
    pub fn apply(&mut self, is_passed: bool) -> Option<ScenarioTransition> {
        let block = self.current_block()?.clone();

        let timed_out = self.turn_counter >= Self::timeout_threshold(block.target_duration);
        if !is_passed && !timed_out {
            self.turn_counter += 1;
            return None;
        }

        let reason = if is_passed {
            AdvanceReason::Passed
        } else {
            AdvanceReason::Timeout
        };
        self.current_index += 1;
        self.turn_counter = 0;

        let next = self.current_block();
        Some(ScenarioTransition {
            from: block.title,
            to: next.map(|b| b.title.clone()),
            key_points: next.map(|b| b.key_points.clone()).unwrap_or_default(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(durations: &[u32]) -> ScenarioState {
        ScenarioState::new(
            durations
                .iter()
                .enumerate()
                .map(|(i, d)| ScenarioBlock::new(&format!("block-{}", i), *d, vec![format!("kp-{}", i)]))
                .collect(),
        )
    }

    #[test]
    fn test_timeout_threshold() {
        assert_eq!(ScenarioState::timeout_threshold(3), 2);
        assert_eq!(ScenarioState::timeout_threshold(5), 4);
        assert_eq!(ScenarioState::timeout_threshold(2), 1);
        assert_eq!(ScenarioState::timeout_threshold(1), MIN_TIMEOUT_TURNS);
        assert_eq!(ScenarioState::timeout_threshold(0), MIN_TIMEOUT_TURNS);
    }

    #[test]
    fn test_timeout_advance_on_third_failing_turn() {
        let mut state = scenario(&[3, 3]);
        assert_eq!(state.apply(false), None);
        assert_eq!(state.turn_counter, 1);
        assert_eq!(state.apply(false), None);
        assert_eq!(state.turn_counter, 2);

        let transition = state.apply(false).unwrap();
        assert_eq!(transition.from, "block-0");
        assert_eq!(transition.to.as_deref(), Some("block-1"));
        assert_eq!(transition.key_points, vec!["kp-1".to_string()]);
        assert_eq!(transition.reason, AdvanceReason::Timeout);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.turn_counter, 0);
    }

    #[test]
    fn test_pass_from_last_block_is_terminal() {
        let mut state = scenario(&[4]);
        let transition = state.apply(true).unwrap();
        assert_eq!(transition.to, None);
        assert_eq!(transition.reason, AdvanceReason::Passed);
        assert!(state.is_terminal());

        // Terminal state is absorbing.
        assert_eq!(state.apply(true), None);
        assert_eq!(state.current_index, 1);
    }

    #[test]
    fn test_from_checklist_groups_by_category() {
        let items = vec![
            ChecklistItem::new("1", "Rust ownership", "technical_skill", 5.0),
            ChecklistItem::new("2", "Team communication", "soft_skill", 3.0),
            ChecklistItem::new("3", "Async runtimes", "technical_skill", 4.0),
        ];
        let state = ScenarioState::from_checklist(&items, 4);
        assert_eq!(state.blocks.len(), 2);
        assert_eq!(state.blocks[0].title, "technical_skill");
        assert_eq!(
            state.blocks[0].key_points,
            vec!["Rust ownership".to_string(), "Async runtimes".to_string()]
        );
        assert_eq!(state.blocks[1].position, 1);
        assert_eq!(state.blocks[1].target_duration, 4);
    }

    #[test]
    fn test_empty_scenario_is_terminal() {
        let mut state = ScenarioState::new(vec![]);
        assert!(state.is_terminal());
        assert_eq!(state.apply(false), None);
    }
}
