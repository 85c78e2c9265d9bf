//! Block-completion and misbehavior judges.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::ScenarioBlock;
use crate::config::OrchestratorConfig;
use crate::model::{complete_within, parse_json, SharedModel};
use crate::prompts;
use crate::store::Message;

/// Whether the current block has been covered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerdict {
    #[serde(default)]
    pub is_passed: bool,
    #[serde(default)]
    pub comment: String,
}

/// Whether the participant's conduct requires ending the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConductVerdict {
    #[serde(default)]
    pub is_need_finish: bool,
    #[serde(default)]
    pub reason: String,
}

/// Runs both scenario judges. Failures yield the `Default` verdicts.
pub struct ScenarioChecker {
    model: SharedModel,
    timeout: Duration,
}

impl ScenarioChecker {
    pub fn new(model: SharedModel, config: &OrchestratorConfig) -> Self {
        Self {
            model,
            timeout: config.judge_timeout(),
        }
    }

    pub async fn check_block(&self, block: &ScenarioBlock, window: &[Message]) -> BlockVerdict {
        let prompt = prompts::block_checker(
            &block.title,
            &block.key_points,
            &prompts::format_messages(window),
        );
        self.judge(&prompt, "block").await
    }

    pub async fn check_conduct(&self, window: &[Message]) -> ConductVerdict {
        let prompt = prompts::conduct_checker(&prompts::format_messages(window));
        self.judge(&prompt, "conduct").await
    }

    /// Both judges, run concurrently as independent calls.
    pub async fn check(
        &self,
        block: &ScenarioBlock,
        window: &[Message],
    ) -> (BlockVerdict, ConductVerdict) {
        tokio::join!(self.check_block(block, window), self.check_conduct(window))
    }

    async fn judge<T>(&self, prompt: &str, kind: &'static str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match complete_within(self.model.as_ref(), prompt, self.timeout).await {
            Ok(response) => parse_json(&response).unwrap_or_else(|| {
                warn!(judge = kind, "Scenario judge returned malformed output");
                T::default()
            }),
            Err(e) => {
                warn!(judge = kind, error = %e, "Scenario judge failed");
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::prompts::{BLOCK_CHECKER_TAG, CONDUCT_CHECKER_TAG};
    use std::sync::Arc;

    fn block() -> ScenarioBlock {
        ScenarioBlock::new("Intro", 3, vec!["background".into()])
    }

    #[tokio::test]
    async fn test_parses_both_verdicts() {
        let model = ScriptedModel::new()
            .respond(BLOCK_CHECKER_TAG, r#"{"is_passed": true, "comment": "covered"}"#)
            .respond(CONDUCT_CHECKER_TAG, r#"```json
{"is_need_finish": true, "reason": "abusive"}
```"#);
        let checker = ScenarioChecker::new(Arc::new(model), &OrchestratorConfig::default());

        let (block_verdict, conduct) = checker.check(&block(), &[]).await;
        assert!(block_verdict.is_passed);
        assert_eq!(block_verdict.comment, "covered");
        assert!(conduct.is_need_finish);
    }

    #[tokio::test]
    async fn test_failures_default_to_neutral() {
        let model = ScriptedModel::new()
            .fail(BLOCK_CHECKER_TAG)
            .respond(CONDUCT_CHECKER_TAG, "nope");
        let checker = ScenarioChecker::new(Arc::new(model), &OrchestratorConfig::default());

        let (block_verdict, conduct) = checker.check(&block(), &[]).await;
        assert_eq!(block_verdict, BlockVerdict::default());
        assert_eq!(conduct, ConductVerdict::default());
    }
}
