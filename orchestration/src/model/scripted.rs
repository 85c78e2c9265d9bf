//! Deterministic model backend driven by prompt-substring rules.
//!
//! Used for offline runs and tests. Each rule matches when its needle is
//! contained in the prompt; the first matching rule answers. A rule with
//! several queued responses pops them in order and then keeps repeating the
//! last one.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ModelError, ModelResult, ModelService};

#[derive(Debug, Clone)]
enum ScriptedResponse {
    Text(String),
    Fail(String),
    Stall,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<ScriptedResponse>,
}

/// A scripted [`ModelService`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Mutex<Vec<Rule>>,
    default: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Create a model with no rules. Unmatched prompts fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text response for prompts containing `needle`.
    pub fn respond(self, needle: &str, text: &str) -> Self {
        self.push(needle, ScriptedResponse::Text(text.to_string()))
    }

    /// Queue a failure for prompts containing `needle`.
    pub fn fail(self, needle: &str) -> Self {
        self.push(
            needle,
            ScriptedResponse::Fail(format!("scripted failure for `{}`", needle)),
        )
    }

    /// Queue a call that never completes.
    pub fn stall(self, needle: &str) -> Self {
        self.push(needle, ScriptedResponse::Stall)
    }

    /// Answer unmatched prompts with `text` instead of failing.
    pub fn with_default(mut self, text: &str) -> Self {
        self.default = Some(text.to_string());
        self
    }

    fn push(mut self, needle: &str, response: ScriptedResponse) -> Self {
        let rules = self
            .rules
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match rules.iter_mut().find(|r| r.needle == needle) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                needle: needle.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    /// Every prompt received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Prompts received that contain `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|p| p.contains(needle))
            .collect()
    }

    fn next_response(&self, prompt: &str) -> Option<ScriptedResponse> {
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rule = rules.iter_mut().find(|r| prompt.contains(&r.needle))?;
        if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        }
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn complete(&self, prompt: &str) -> ModelResult<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        match self.next_response(prompt) {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::Fail(reason)) => Err(ModelError::Request(reason)),
            Some(ScriptedResponse::Stall) => {
                futures::future::pending::<()>().await;
                Err(ModelError::EmptyResponse)
            }
            None => self
                .default
                .clone()
                .ok_or_else(|| ModelError::Request("no scripted response".to_string())),
        }
    }
}
