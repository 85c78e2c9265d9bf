//! Orchestrator configuration.
//!
//! Every knob has a default matching the production deployment, so an empty
//! TOML file (or no file at all) yields a working configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How categories without any checklist items are treated in the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryWeighting {
    /// Missing categories score 0 and keep their weight in the denominator.
    ZeroFill,
    /// Missing categories are left out of numerator and denominator.
    Exclude,
}

impl std::fmt::Display for CategoryWeighting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroFill => write!(f, "zero_fill"),
            Self::Exclude => write!(f, "exclude"),
        }
    }
}

/// Tunables for the fact pipeline, scenario pacing, reply composition and
/// post-session scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on claims extracted from one utterance.
    pub max_claims_per_message: usize,
    /// Neighbors fetched for pairwise arbitration.
    pub arbitration_neighbors: usize,
    /// Neighbors fetched for a guardian sweep.
    pub guardian_neighbors: usize,
    /// Number of trailing messages shown to quality and scenario judges.
    pub transcript_window: usize,
    /// Target duration (turns) for blocks derived from a checklist.
    pub default_block_duration: u32,
    /// Transcript fragments retrieved per checklist item when scoring.
    pub scoring_fragments: usize,
    /// Upper bound on any single judge call, in seconds.
    pub judge_timeout_secs: u64,
    /// Optimistic-write attempts for the facts and scenario blobs.
    pub max_write_attempts: u32,
    /// Serialize turns of the same session behind a per-session lock.
    pub serialize_turns: bool,
    /// Marker a composed reply carries to end the interview.
    pub finish_marker: String,
    /// Reply sent when composition fails.
    pub fallback_reply: String,
    /// Reply sent when the misbehavior judge forces a finish.
    pub forced_finish_reply: String,
    /// System notice when the interviewer closes the interview.
    pub finish_notice: String,
    /// System notice when the interview is terminated early.
    pub forced_finish_notice: String,
    /// Greeting used when the opening message cannot be generated.
    pub opening_fallback: String,
    /// Category weights used for the final score.
    pub category_weights: BTreeMap<String, f64>,
    /// Treatment of categories with no checklist items.
    pub category_weighting: CategoryWeighting,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut category_weights = BTreeMap::new();
        category_weights.insert("technical_skill".to_string(), 0.7);
        category_weights.insert("soft_skill".to_string(), 0.3);

        Self {
            max_claims_per_message: 3,
            arbitration_neighbors: 2,
            guardian_neighbors: 3,
            transcript_window: 6,
            default_block_duration: 4,
            scoring_fragments: 3,
            judge_timeout_secs: 60,
            max_write_attempts: 3,
            serialize_turns: true,
            finish_marker: "*FINISH CALL*".to_string(),
            fallback_reply: "Sorry, I need a moment. Could you expand a little on your last answer?"
                .to_string(),
            forced_finish_reply:
                "Thank you for your time. We are ending the interview here.".to_string(),
            finish_notice: "The interviewer has ended the conversation".to_string(),
            forced_finish_notice: "The conversation was terminated".to_string(),
            opening_fallback:
                "Hello! Thanks for joining. Could you start by telling me a bit about yourself?"
                    .to_string(),
            category_weights,
            category_weighting: CategoryWeighting::ZeroFill,
        }
    }
}

impl OrchestratorConfig {
    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values that would stall or break the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transcript_window == 0 {
            return Err(ConfigError::Invalid {
                field: "transcript_window",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.judge_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "judge_timeout_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.max_write_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_write_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.finish_marker.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "finish_marker",
                reason: "must not be blank".to_string(),
            });
        }
        if let Some((name, weight)) = self
            .category_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ConfigError::Invalid {
                field: "category_weights",
                reason: format!("weight for `{}` is {}", name, weight),
            });
        }
        Ok(())
    }

    /// Judge timeout as a [`Duration`].
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }
}
