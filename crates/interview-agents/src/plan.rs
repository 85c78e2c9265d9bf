//! Interview plan files.
//!
//! A plan is the TOML description of one interview: interviewer
//! instructions, the checklist it is scored against, an optional explicit
//! scenario and claims pre-extracted from the candidate's resume.
//!
//! ```toml
//! system_prompt = "You interview backend engineers."
//! title = "Backend screening"
//!
//! [[checklist]]
//! id = "ownership"
//! description = "Rust ownership and borrowing"
//! category = "technical_skill"
//! weight = 6
//!
//! [[scenario]]
//! title = "Introduction"
//! target_duration = 2
//!
//! [[resume_claims]]
//! text = "5 years of experience with Vue"
//! topic = "experience"
//! ```

use std::path::Path;

use interview_orchestration::{ChecklistItem, DocumentClaim, NewSession, ScenarioBlock};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to read plan {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid plan: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanBlock {
    pub title: String,
    #[serde(default = "default_block_duration")]
    pub target_duration: u32,
    #[serde(default)]
    pub key_points: Vec<String>,
}

fn default_block_duration() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewPlan {
    pub system_prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Fixed first message; generated by the model when absent.
    #[serde(default)]
    pub opening: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub scenario: Vec<PlanBlock>,
    #[serde(default)]
    pub resume_claims: Vec<DocumentClaim>,
}

impl InterviewPlan {
    pub fn from_toml_str(raw: &str) -> Result<Self, PlanError> {
        let plan: Self = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PlanError::Invalid("system_prompt must not be blank".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &self.checklist {
            if !seen.insert(item.id.as_str()) {
                return Err(PlanError::Invalid(format!(
                    "duplicate checklist id `{}`",
                    item.id
                )));
            }
        }
        Ok(())
    }

    /// Session request for the orchestrator. An empty scenario lets the
    /// orchestrator derive one from the checklist.
    pub fn into_new_session(self) -> NewSession {
        let mut session = NewSession::new(&self.system_prompt)
            .with_checklist(self.checklist)
            .with_document_claims(self.resume_claims);
        if let Some(title) = &self.title {
            session = session.with_title(title);
        }
        if let Some(opening) = &self.opening {
            session = session.with_opening(opening);
        }
        if !self.scenario.is_empty() {
            session = session.with_scenario(
                self.scenario
                    .into_iter()
                    .map(|b| ScenarioBlock::new(&b.title, b.target_duration, b.key_points))
                    .collect(),
            );
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
system_prompt = "You interview backend engineers."
title = "Backend screening"

[[checklist]]
id = "ownership"
description = "Rust ownership and borrowing"
category = "technical_skill"
weight = 6.0

[[scenario]]
title = "Introduction"
target_duration = 2

[[scenario]]
title = "Rust"
key_points = ["ownership", "async"]

[[resume_claims]]
text = "5 years of experience with Vue"
"#;

    #[test]
    fn test_parse_plan() {
        let plan = InterviewPlan::from_toml_str(PLAN).unwrap();
        assert_eq!(plan.checklist.len(), 1);
        assert_eq!(plan.checklist[0].score, None);
        assert_eq!(plan.scenario[0].target_duration, 2);
        assert_eq!(plan.scenario[1].target_duration, 3);
        assert_eq!(plan.resume_claims[0].topic, None);

        let session = plan.into_new_session();
        assert_eq!(session.scenario.as_ref().map(Vec::len), Some(2));
        assert_eq!(session.document_claims.len(), 1);
        assert_eq!(session.title.as_deref(), Some("Backend screening"));
    }

    #[test]
    fn test_rejects_blank_prompt_and_duplicate_ids() {
        assert!(matches!(
            InterviewPlan::from_toml_str("system_prompt = \"  \""),
            Err(PlanError::Invalid(_))
        ));

        let dup = r#"
system_prompt = "sys"
[[checklist]]
id = "a"
description = "x"
category = "technical_skill"
weight = 1.0
[[checklist]]
id = "a"
description = "y"
category = "soft_skill"
weight = 1.0
"#;
        assert!(matches!(
            InterviewPlan::from_toml_str(dup),
            Err(PlanError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_plan_file() {
        assert!(matches!(
            InterviewPlan::load("/nonexistent/plan.toml"),
            Err(PlanError::Read { .. })
        ));
    }
}
